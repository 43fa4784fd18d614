//! Error types for oauth-relay

use std::io;

use thiserror::Error;

/// Result type alias for oauth-relay
pub type Result<T> = std::result::Result<T, Error>;

/// Relay errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener bind error
    #[error("Bind error on port {port}: {reason}")]
    Bind {
        /// Port the bind was attempted on
        port: u16,
        /// Underlying failure
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
