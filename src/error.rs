//! Error types for vcr-proxy

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for vcr-proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Errors that can occur while proxying, recording or replaying
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Inbound path has no entry in the route table
    #[error("Could not find test route redirect for {0}")]
    RouteNotFound(String),

    /// Inbound method is neither GET nor POST
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// No recorded interaction matches the request
    #[error("No recorded interaction for {method} {uri}")]
    RecordingNotFound {
        /// Request method
        method: String,
        /// Upstream URI
        uri: String,
    },

    /// The real upstream could not be reached or timed out
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// A request body could not be evaluated by the relaxed matcher
    #[error("Match assertion failed: {0}")]
    MatchAssertion(String),

    /// Cassette file exists but cannot be parsed
    #[error("Corrupt cassette {}: {reason}", path.display())]
    CorruptCassette {
        /// Cassette file path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
