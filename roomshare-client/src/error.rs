use std::time::Duration;

use roomshare_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {path} returned status {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },
    #[error("response decode failed: {0}")]
    Decode(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Coarse classification used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Dropped connection, timeout, non-success status. Always retryable.
    TransientNetwork,
    /// A frame or response body that could not be decoded.
    ProtocolDecode,
    /// Bad input from the user or the command line.
    Usage,
}

impl ClientError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Http(err) if err.is_decode() => FailureKind::ProtocolDecode,
            ClientError::Http(_)
            | ClientError::Status { .. }
            | ClientError::WebSocket(_)
            | ClientError::ConnectTimeout(_)
            | ClientError::Io(_)
            | ClientError::NotConnected => FailureKind::TransientNetwork,
            ClientError::Decode(_) | ClientError::Core(CoreError::Serialization(_)) => {
                FailureKind::ProtocolDecode
            }
            ClientError::EmptyMessage | ClientError::Config(_) | ClientError::Core(_) => {
                FailureKind::Usage
            }
        }
    }
}
