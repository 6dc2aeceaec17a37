//! Session error types

use crate::transport::TransportError;

/// Errors raised while talking to the Flux server
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Request never produced a response
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Server rejected the configured credentials
    #[error("authorization failed at {url}")]
    Authorization { url: String },
    /// Server answered with a status the caller cannot act on
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
    /// No server has been discovered yet
    #[error("no server selected")]
    NoServerSelected,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
