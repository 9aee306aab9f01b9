//! Error types for Lumen telemetry

use thiserror::Error;

/// Result type alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Main error type for the metric registry and tracer
///
/// Configuration problems surface at registration time and leave no state
/// behind. Type mismatches surface at call time before anything is mutated.
/// Read accessors never produce errors; they return `None` instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TelemetryError {
    /// Invalid metric or label name, bad option, unknown metric kind
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not supported by the metric's kind
    #[error("Type mismatch: '{operation}' is not supported by {kind} metric '{metric}'")]
    TypeMismatch {
        metric: String,
        kind: String,
        operation: &'static str,
    },

    /// Value rejected by the metric (non-finite, negative counter delta, ...)
    #[error("Invalid value for metric '{metric}': {reason}")]
    InvalidValue { metric: String, reason: String },

    /// Write access to a metric that was never registered
    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    /// Span lifecycle violation
    #[error("Span '{span}' is {state}, cannot {operation}")]
    InvalidSpanState {
        span: String,
        state: &'static str,
        operation: &'static str,
    },

    /// Background task or runtime problems
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl TelemetryError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a type mismatch error
    pub fn type_mismatch(
        metric: impl Into<String>,
        kind: impl std::fmt::Display,
        operation: &'static str,
    ) -> Self {
        Self::TypeMismatch {
            metric: metric.into(),
            kind: kind.to_string(),
            operation,
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }

    /// Stable code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "TELEMETRY_CONFIG",
            Self::TypeMismatch { .. } => "TELEMETRY_TYPE_MISMATCH",
            Self::InvalidValue { .. } => "TELEMETRY_INVALID_VALUE",
            Self::MetricNotFound(_) => "TELEMETRY_METRIC_NOT_FOUND",
            Self::InvalidSpanState { .. } => "TELEMETRY_SPAN_STATE",
            Self::Runtime(_) => "TELEMETRY_RUNTIME",
        }
    }

    /// Whether the error was raised while validating configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<toml::de::Error> for TelemetryError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid telemetry configuration: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TelemetryError::config("x").error_code(), "TELEMETRY_CONFIG");
        assert_eq!(
            TelemetryError::MetricNotFound("m".into()).error_code(),
            "TELEMETRY_METRIC_NOT_FOUND"
        );
        assert_eq!(
            TelemetryError::runtime("no runtime").error_code(),
            "TELEMETRY_RUNTIME"
        );
    }

    #[test]
    fn test_type_mismatch_message() {
        let err = TelemetryError::type_mismatch("requests", "counter", "decrement");
        assert_eq!(
            err.to_string(),
            "Type mismatch: 'decrement' is not supported by counter metric 'requests'"
        );
        assert!(!err.is_config());
    }
}
