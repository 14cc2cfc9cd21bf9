pub mod config;
pub mod errors;
pub mod lineup;
pub mod matcher;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod services;
pub mod sources;
pub mod utils;
