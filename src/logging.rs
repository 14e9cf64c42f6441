//! Structured Logging
//!
//! JSON output in production for log aggregation, pretty output for
//! development. The filter honors `RUST_LOG` when set and falls back to the
//! configured level for the crate's own targets.

use thiserror::Error;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::RelayerConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Initialize the logging system from configuration.
pub fn init_from_config(config: &RelayerConfig) -> Result<(), LoggingError> {
    init_logging(&config.log_level, config.is_production)
}

/// Initialize with an explicit level and format.
pub fn init_logging(level: &str, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("veil={level},tower_http={level},axum={level}")));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}
