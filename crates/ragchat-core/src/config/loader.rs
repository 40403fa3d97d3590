//! Configuration loader for YAML files and environment resolution
//!
//! Values come from three places, later ones winning: built-in defaults,
//! an optional YAML file, then the `HOST`, `PORT` and `ENVIRONMENT`
//! environment variables.

use crate::config::types::*;
use crate::errors::RagError;
use std::path::Path;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig, RagError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            RagError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        log::debug!("Loaded configuration file {}", path.display());
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<AppConfig, RagError> {
        let mut config: AppConfig = if content.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| RagError::Config(format!("Failed to parse YAML config: {}", e)))?
        };

        Self::apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Load the configuration from `path` when given, otherwise start from defaults.
    pub async fn load(path: Option<&Path>) -> Result<AppConfig, RagError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => Self::from_str(""),
        }
    }

    /// Apply `HOST`, `PORT` and `ENVIRONMENT` from the process environment
    pub fn apply_env_overrides(config: &mut AppConfig) -> Result<(), RagError> {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_overrides_from<F>(config: &mut AppConfig, lookup: F) -> Result<(), RagError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            config.server.host = host;
        }

        if let Some(port) = lookup("PORT").filter(|p| !p.trim().is_empty()) {
            config.server.port = port.trim().parse().map_err(|_| {
                RagError::Config(format!("PORT must be a valid port number, got '{}'", port))
            })?;
        }

        if let Some(environment) = lookup("ENVIRONMENT").filter(|e| !e.trim().is_empty()) {
            config.environment = environment.parse()?;
        }

        Ok(())
    }
}
