use thiserror::Error;

use crate::session::ConnectionState;

/// Failure to obtain the local microphone stream
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no audio input device available")]
    NoDevice,

    #[error("audio device error: {0}")]
    Device(String),
}

/// A session description was malformed or rejected by the peer connection
#[derive(Debug, Error)]
#[error("negotiation failed: {0}")]
pub struct NegotiationError(pub String);

impl NegotiationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure of the offer/answer exchange with the backend
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed answer from backend: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("signaling request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Anything that ends a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("connection lost (peer connection {0})")]
    ConnectionLost(ConnectionState),
}
