/// Error types for reference resolution

use thiserror::Error;

/// Why a reference resolver could not produce a prompt.
///
/// A prompt that simply does not exist is not an error: resolvers return
/// `Ok(None)` for it.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reference path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl ResolveError {
    pub fn other(message: impl Into<String>) -> Self {
        ResolveError::Other(message.into())
    }
}
