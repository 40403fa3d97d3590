//! Configuration module
//!
//! YAML configuration with sensible defaults for every field. See
//! [`ConfigLoader`] for the resolution order.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::RagError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, RagError> {
    ConfigLoader::from_file(path).await
}
