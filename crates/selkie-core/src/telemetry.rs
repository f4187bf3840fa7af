//! Telemetry bootstrap
//!
//! Structured logging via `tracing`; the subscriber is installed once at
//! process start. Formatting and filtering follow `RUST_LOG` when present.

use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name included in log lines
    pub service_name: String,
    /// Log level filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Whether to include ANSI colors
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "selkie".to_string(),
            log_level: "info".to_string(),
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Create from environment variables (`RUST_LOG`)
    pub fn from_env() -> Self {
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        Self {
            log_level,
            ..Default::default()
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// Returns an error if a subscriber is already installed or the filter
/// directive cannot be parsed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::InvalidConfiguration {
            field: "log_level".into(),
            reason: e.to_string(),
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Internal {
            message: format!("failed to install tracing subscriber: {}", e),
        })
}
