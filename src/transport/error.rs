//! Transport error types

/// Failures below the HTTP status level
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure or connection reset
    #[error("connection to {url} failed: {details}")]
    Connection { url: String, details: String },
    /// No response within the configured request timeout
    #[error("request to {url} timed out")]
    Timeout { url: String },
    /// Request could not be built (malformed URL or header)
    #[error("invalid request to {url}: {details}")]
    InvalidRequest { url: String, details: String },
    /// Response body could not be read
    #[error("failed to read response from {url}: {details}")]
    Body { url: String, details: String },
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    pub fn url(&self) -> &str {
        match self {
            TransportError::Connection { url, .. }
            | TransportError::Timeout { url }
            | TransportError::InvalidRequest { url, .. }
            | TransportError::Body { url, .. } => url,
        }
    }

    pub(crate) fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout { url: url.to_string() }
        } else if error.is_builder() {
            TransportError::InvalidRequest {
                url: url.to_string(),
                details: error.to_string(),
            }
        } else if error.is_body() || error.is_decode() {
            TransportError::Body {
                url: url.to_string(),
                details: error.to_string(),
            }
        } else {
            TransportError::Connection {
                url: url.to_string(),
                details: error.to_string(),
            }
        }
    }
}
