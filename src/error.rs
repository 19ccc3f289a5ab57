//! Error types for cachet
//!
//! Provides a unified error type for all client operations.

use thiserror::Error;

use crate::protocol::Status;

/// Result type alias using CachetError
pub type Result<T> = std::result::Result<T, CachetError>;

/// Unified error type for cachet operations
#[derive(Debug, Error)]
pub enum CachetError {
    // -------------------------------------------------------------------------
    // Cache Semantics
    // -------------------------------------------------------------------------
    #[error("key not found")]
    NotFound,

    #[error("key already exists")]
    KeyExists,

    /// Any other non-success status reported by the server
    #[error("server error ({status:?}): {message}")]
    Server { status: Status, message: String },

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl CachetError {
    /// Whether this error is fatal to the session.
    ///
    /// Fatal errors are never offered to error handlers and always abort
    /// the run that observes them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CachetError::Connection(_) | CachetError::Protocol(_))
    }
}
