pub mod config;
pub mod terminal;
