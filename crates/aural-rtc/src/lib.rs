//! Peer connections for the detection service.
//!
//! [`PeerConnector`] and [`PeerConnection`] hide the WebRTC transport from
//! the session layer. With the `webrtc` feature (default), [`WebRtcConnector`]
//! negotiates H.264, relays the inbound stream back to the browser and decodes
//! it into [`aural_vision::VideoFrame`]s.

pub mod config;
pub mod error;
pub mod metrics;
pub mod peer;
#[cfg(feature = "webrtc")]
pub mod transport;

pub use config::RtcConfig;
pub use error::{RtcError, RtcResult};
pub use peer::{ChannelTrack, PeerConnection, PeerConnector, PeerEvent, VideoTrack};
#[cfg(feature = "webrtc")]
pub use transport::{WebRtcConnector, WebRtcPeer};
