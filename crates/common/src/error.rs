//! Error handling for the persistence workspace
//!
//! This module defines the error taxonomy shared by every component:
//! - `ComponentError` trait for consistent error handling
//! - `ConfigurationError` for misconfiguration detected before any I/O
//! - `PersistenceError` for lifecycle and query failures
//!
//! # Design Principles
//! - All errors implement Send + Sync for async compatibility
//! - Every failure raised by a component carries a stable code and the
//!   correlation id of the call that produced it
//! - Use thiserror for library errors, anyhow for application errors
//! - Support error chaining: driver failures are kept as the `source`

use thiserror::Error;

/// Boxed cause attached to wrapped failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Base trait for all component errors
///
/// Callers use `code()` to tell "never connected" from "connected but the
/// query failed" from "misconfigured" without matching on message text.
pub trait ComponentError: std::error::Error + Send + Sync + 'static {
    /// Stable, machine-readable error code (for example `NO_HOST`)
    fn code(&self) -> &str;

    /// Correlation id of the call that failed, if one was supplied
    fn correlation_id(&self) -> Option<&str>;
}

/// Configuration-related errors
///
/// These errors occur during configuration loading, parsing, or validation.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed
    #[error("Failed to parse configuration: {details}")]
    ParseError { details: String },

    /// Environment variable error
    #[error("Environment variable error for {var}: {details}")]
    EnvironmentError { var: String, details: String },

    /// Configuration is incomplete or inconsistent
    #[error("{message} ({code})")]
    Invalid {
        correlation_id: Option<String>,
        code: String,
        message: String,
    },
}

impl ConfigurationError {
    /// Create an invalid configuration error with a stable code
    pub fn invalid(
        correlation_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            correlation_id: correlation_id.map(str::to_string),
            code: code.into(),
            message: message.into(),
        }
    }
}

impl ComponentError for ConfigurationError {
    fn code(&self) -> &str {
        match self {
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::ParseError { .. } => "PARSE_ERROR",
            Self::EnvironmentError { .. } => "ENVIRONMENT_ERROR",
            Self::Invalid { code, .. } => code,
        }
    }

    fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Invalid { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }
}

/// Database and persistence-related errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Operation attempted without the required object present or in the
    /// wrong lifecycle state
    #[error("{message} ({code})")]
    InvalidState {
        correlation_id: Option<String>,
        code: String,
        message: String,
    },

    /// Connecting failed or connectivity was lost during a query
    #[error("{message} ({code}): {source}")]
    Connection {
        correlation_id: Option<String>,
        code: String,
        message: String,
        #[source]
        source: BoxError,
    },

    /// Generic operation failure, optionally caused by a driver error
    #[error("{message} ({code})")]
    Operation {
        correlation_id: Option<String>,
        code: String,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Misconfiguration surfaced while opening a component
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl PersistenceError {
    pub fn invalid_state(
        correlation_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            correlation_id: correlation_id.map(str::to_string),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn connection(
        correlation_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Connection {
            correlation_id: correlation_id.map(str::to_string),
            code: code.into(),
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn operation(
        correlation_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            correlation_id: correlation_id.map(str::to_string),
            code: code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach a cause to an `Operation` error; other variants are returned as-is
    pub fn with_cause(self, cause: impl Into<BoxError>) -> Self {
        match self {
            Self::Operation {
                correlation_id,
                code,
                message,
                ..
            } => Self::Operation {
                correlation_id,
                code,
                message,
                source: Some(cause.into()),
            },
            other => other,
        }
    }
}

impl ComponentError for PersistenceError {
    fn code(&self) -> &str {
        match self {
            Self::InvalidState { code, .. }
            | Self::Connection { code, .. }
            | Self::Operation { code, .. } => code,
            Self::Configuration(err) => err.code(),
        }
    }

    fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::InvalidState { correlation_id, .. }
            | Self::Connection { correlation_id, .. }
            | Self::Operation { correlation_id, .. } => correlation_id.as_deref(),
            Self::Configuration(err) => err.correlation_id(),
        }
    }
}

/// Result type alias for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = ConfigurationError::invalid(Some("123"), "NO_HOST", "Connection host is not set");
        let display = format!("{err}");
        assert!(display.contains("NO_HOST"));
        assert!(display.contains("Connection host is not set"));
    }

    #[test]
    fn test_code_and_correlation_id() {
        let err = PersistenceError::invalid_state(Some("abc"), "NO_CONNECTION", "missing");
        assert_eq!(err.code(), "NO_CONNECTION");
        assert_eq!(err.correlation_id(), Some("abc"));

        let wrapped: PersistenceError =
            ConfigurationError::invalid(Some("xyz"), "NO_PORT", "Connection port is not set").into();
        assert_eq!(wrapped.code(), "NO_PORT");
        assert_eq!(wrapped.correlation_id(), Some("xyz"));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = PersistenceError::connection(None, "CONNECT_FAILED", "Connection failed", io_error);
        assert!(err.source().is_some());
        assert_eq!(err.correlation_id(), None);

        let op = PersistenceError::operation(None, "QUERY_FAILED", "Query failed");
        assert!(op.source().is_none());
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(op.with_cause(io_error).source().is_some());
    }

    #[test]
    fn test_component_error_trait() {
        fn accepts(_: impl ComponentError) {}

        accepts(ConfigurationError::ParseError {
            details: "test".to_string(),
        });
        accepts(PersistenceError::operation(None, "X", "y"));
    }
}
