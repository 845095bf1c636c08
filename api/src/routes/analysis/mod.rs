pub mod analysis_route;
