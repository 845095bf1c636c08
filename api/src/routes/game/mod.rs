pub mod game_route;
pub mod save_route;
