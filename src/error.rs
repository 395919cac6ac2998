//! Server error types.

use thiserror::Error;

/// Errors that can stop the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
