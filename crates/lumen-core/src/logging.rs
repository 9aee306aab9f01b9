//! Logging configuration
//!
//! The library itself only emits `tracing` events; hosts that do not install
//! their own subscriber can call [`init_logging`].

use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{TelemetryError, TelemetryResult};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,
    /// Single-line human-readable output
    Compact,
    /// Structured JSON lines
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (e.g. "info", "lumen_core=debug")
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Merge with another logging config
    pub fn merge(&mut self, other: LoggingConfig) {
        if !other.level.is_empty() {
            self.level = other.level;
        }
        self.format = other.format;
    }
}

/// Install a global `tracing` subscriber for the given configuration
///
/// Fails when the filter does not parse or a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| TelemetryError::config(format!("invalid log filter '{}': {}", config.level, e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    installed.map_err(|e| TelemetryError::runtime(format!("logging already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_logging_config_merge() {
        let mut config = LoggingConfig::default();
        config.merge(LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Json,
        });
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);

        config.merge(LoggingConfig {
            level: String::new(),
            format: LogFormat::Compact,
        });
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let config = LoggingConfig {
            level: "lumen_core=verbose".to_string(),
            format: LogFormat::Compact,
        };
        let err = init_logging(&config).unwrap_err();
        assert!(err.is_config());
    }
}
