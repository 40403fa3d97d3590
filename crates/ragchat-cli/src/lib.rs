//! Launcher helpers for the `rag` binary
//!
//! Parsing of the logging level, worker-thread sizing and the translation of
//! command-line flags into an [`AppConfig`] live here so they can be tested
//! without starting a runtime.

use anyhow::{bail, Result};
use log::LevelFilter;
use ragchat_core::{AppConfig, Environment};

/// Parse a logging level as accepted on the command line.
///
/// `WARNING` is accepted as an alias of `WARN`.
pub fn parse_log_level(level: &str) -> Result<LevelFilter> {
    let filter = match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        other => bail!(
            "Unknown logging level '{}', expected one of TRACE, DEBUG, INFO, WARNING, ERROR",
            other
        ),
    };
    Ok(filter)
}

/// Number of runtime worker threads for a requested count.
///
/// Zero or negative means every available CPU; anything else is capped at the
/// CPU count.
pub fn worker_threads(requested: i64, available: usize) -> usize {
    let available = available.max(1);
    if requested <= 0 {
        available
    } else {
        (requested as usize).min(available)
    }
}

/// CPUs visible to the process, falling back to one.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Apply command-line overrides on top of a loaded configuration.
pub fn apply_cli_overrides(
    mut config: AppConfig,
    environment: Environment,
    host: Option<String>,
    port: Option<u16>,
) -> Result<AppConfig> {
    config.environment = environment;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}
