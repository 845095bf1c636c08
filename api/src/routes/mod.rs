pub mod analysis;
pub mod creative;
pub mod game;
pub mod projects;
