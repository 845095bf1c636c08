pub mod creative_request;
pub mod creative_route;
