//! Shared data models for the Aural Eyes backend.
//!
//! This crate provides Serde-serializable types for:
//! - Detections and per-frame results pushed to clients
//! - Session identifiers and peer connection states
//! - Signaling message envelopes exchanged over the WebSocket

pub mod detection;
pub mod session;
pub mod signaling;

// Re-export common types
pub use detection::{BoundingBox, Detection, FrameResult};
pub use session::{PeerState, SessionId, SessionState};
pub use signaling::{ClientMessage, IceCandidate, SdpType, ServerMessage, SessionDescription};
