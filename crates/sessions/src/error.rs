use thiserror::Error;

use waygate_transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The id is empty, too long, or contains characters unsafe for path
    /// construction.
    #[error("invalid session id")]
    InvalidSessionId,
    /// The legacy auth mode is reserved but not implemented.
    #[error("legacy sessions are not supported")]
    LegacyUnsupported,
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
