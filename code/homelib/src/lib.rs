pub mod config;
pub mod display;
pub mod store;
pub mod types;
pub mod weather;
