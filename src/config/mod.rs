//! Configuration: YAML file plus environment overrides.

pub mod loader;
pub mod schema;

pub use loader::load_config;
pub use schema::{AppConfig, ServerConfig, StoreConfig};
