//! # REMC Common
//!
//! Shared pieces of the REMC offline worker crates.
//!
//! ## Features
//!
//! - One error type for cache, network, install and config failures
//! - `tracing` subscriber setup
//! - Deadline helper for network round-trips

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod timeout;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use timeout::with_timeout;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the offline worker.
#[derive(Error, Debug)]
pub enum RemcError {
    /// Network round-trip failed or was unreachable.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Cache store read/write failed.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Pre-caching the static asset list failed; nothing was committed.
    #[error("Install failed: {message}")]
    Install {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Worker registration is in the wrong state for the request.
    #[error("State error: {0}")]
    State(String),

    /// Bad or unreadable configuration.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A window client or notification operation failed.
    #[error("Client error: {0}")]
    Client(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        trace: Option<backtrace::Backtrace>,
    },
}

impl RemcError {
    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create an install error.
    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
            source: None,
        }
    }

    /// Create an install error wrapping the failure that aborted it.
    pub fn install_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Install {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            trace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Whether a later attempt (e.g. the next page load) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemcError::Network { .. }
                | RemcError::Install { .. }
                | RemcError::Timeout(_)
        )
    }

    /// Short category name, used as a log field.
    pub fn category(&self) -> &'static str {
        match self {
            RemcError::Network { .. } => "network",
            RemcError::Cache { .. } => "cache",
            RemcError::Install { .. } => "install",
            RemcError::State(_) => "state",
            RemcError::Config { .. } => "config",
            RemcError::Client(_) => "client",
            RemcError::Timeout(_) => "timeout",
            RemcError::NotFound(_) => "not_found",
            RemcError::InvalidArgument(_) => "invalid_argument",
            RemcError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for offline worker operations.
pub type Result<T> = std::result::Result<T, RemcError>;

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| RemcError::NotFound(resource.into()))
    }
}
