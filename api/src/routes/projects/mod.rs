pub mod project_route;
