//! Errors raised while talking to the chat backend.
//!
//! Everything else in the crate reports through `anyhow`; backend failures
//! get their own type because the exchange turns them into conversation text
//! instead of propagating them.

use thiserror::Error;

/// Failure of a single backend request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The server answered with a non-success status
    #[error("Error {status}: {body}")]
    Status { status: u16, body: String },

    /// The request never produced a response (DNS, refused, timeout, ...)
    #[error("Connection Failed: {0}")]
    Transport(String),
}

impl BackendError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            BackendError::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}
