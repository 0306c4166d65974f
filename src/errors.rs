//! Error types for the toastd daemon.
//!
//! Structured errors for the startup and configuration paths; steady-state
//! lifecycle races (closing an already-closed notification, losing a signal)
//! are not errors and are handled as idempotent no-ops where they occur.

use std::path::PathBuf;
use thiserror::Error;

/// Daemon-level error type.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Another daemon already owns the well-known notification bus name.
    /// Fatal at startup, never retried.
    #[error("failed to claim bus name '{name}': another notification daemon is likely running")]
    BusClaim {
        name: String,
        #[source]
        source: zbus::Error,
    },

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("file I/O error for '{path}': {operation}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenience type alias for Results using DaemonError.
pub type DaemonResult<T> = Result<T, DaemonError>;

impl DaemonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<toml::de::Error> for DaemonError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = DaemonError::config("bad timeout table");
        assert_eq!(err.to_string(), "configuration error: bad timeout table");
    }

    #[test]
    fn test_io_error_carries_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = DaemonError::io_with_source("/tmp/toastd.toml", "read", io);
        assert!(err.to_string().contains("/tmp/toastd.toml"));
    }
}
