//! Error types for peer connection operations.

use thiserror::Error;

/// Result type for peer connection operations.
pub type RtcResult<T> = Result<T, RtcError>;

#[derive(Debug, Error)]
pub enum RtcError {
    #[error("Invalid SDP: {0}")]
    InvalidSdp(String),

    #[error("Invalid ICE candidate: {0}")]
    InvalidCandidate(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Peer connection closed")]
    Closed,

    #[error("WebRTC error: {0}")]
    Transport(String),
}

impl RtcError {
    pub fn invalid_sdp(message: impl Into<String>) -> Self {
        Self::InvalidSdp(message.into())
    }

    pub fn invalid_candidate(message: impl Into<String>) -> Self {
        Self::InvalidCandidate(message.into())
    }

    pub fn negotiation(message: impl Into<String>) -> Self {
        Self::Negotiation(message.into())
    }

    pub fn decoder(message: impl Into<String>) -> Self {
        Self::Decoder(message.into())
    }
}

#[cfg(feature = "webrtc")]
impl From<webrtc::Error> for RtcError {
    fn from(e: webrtc::Error) -> Self {
        RtcError::Transport(e.to_string())
    }
}
