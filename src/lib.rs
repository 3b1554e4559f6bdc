pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod services;
pub mod system_config;
pub mod vending;
pub mod workers;
