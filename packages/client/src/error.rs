//! Error types for the collaboration client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The transport could not be opened or failed mid-session
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The gateway closed the connection
    #[error("Connection closed by server (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    /// Every reconnect attempt failed
    #[error("Gave up after {attempts} reconnect attempt(s)")]
    ReconnectExhausted { attempts: u32 },

    /// The HTTP API answered with an error status
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(e.to_string())
    }
}
