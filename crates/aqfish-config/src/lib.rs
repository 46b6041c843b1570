mod raw;
mod loader;
pub mod model;
pub mod error;

pub use loader::load_config;
pub use model::{Config, DriverConfig, DriversConfig, ElectionConfig};
pub use error::ConfigError;
