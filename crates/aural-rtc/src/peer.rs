//! Peer connection contracts.
//!
//! The session layer only talks to these traits; the concrete transport is
//! chosen at startup through a [`PeerConnector`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use aural_models::{IceCandidate, PeerState, SessionDescription};
use aural_vision::VideoFrame;
use tokio::sync::mpsc;

use crate::error::RtcResult;

/// One negotiated connection with a browser.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Apply the remote offer or answer.
    async fn set_remote_description(&self, description: SessionDescription) -> RtcResult<()>;

    /// Create the local answer, apply it and wait for ICE gathering.
    async fn create_answer(&self) -> RtcResult<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> RtcResult<()>;

    fn connection_state(&self) -> PeerState;

    async fn close(&self) -> RtcResult<()>;
}

/// Factory for peer connections.
///
/// Everything a peer reports after creation arrives on `events`.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> RtcResult<Arc<dyn PeerConnection>>;
}

/// A remote video track decoded into frames.
#[async_trait]
pub trait VideoTrack: Send {
    fn id(&self) -> &str;

    /// Next decoded frame; `None` once the track has ended.
    async fn recv(&mut self) -> Option<VideoFrame>;
}

/// Notifications raised by a peer connection.
pub enum PeerEvent {
    Track(Box<dyn VideoTrack>),
    DataChannel { label: String },
    StateChanged(PeerState),
}

impl PeerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerEvent::Track(_) => "track",
            PeerEvent::DataChannel { .. } => "data_channel",
            PeerEvent::StateChanged(_) => "state_changed",
        }
    }
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::Track(track) => f.debug_tuple("Track").field(&track.id()).finish(),
            PeerEvent::DataChannel { label } => {
                f.debug_struct("DataChannel").field("label", label).finish()
            }
            PeerEvent::StateChanged(state) => f.debug_tuple("StateChanged").field(state).finish(),
        }
    }
}

/// [`VideoTrack`] fed from a frame channel.
pub struct ChannelTrack {
    id: String,
    frames: mpsc::Receiver<VideoFrame>,
}

impl ChannelTrack {
    pub fn new(id: impl Into<String>, frames: mpsc::Receiver<VideoFrame>) -> Self {
        Self {
            id: id.into(),
            frames,
        }
    }

    /// Track plus the sender that feeds it.
    pub fn channel(id: impl Into<String>, capacity: usize) -> (mpsc::Sender<VideoFrame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(id, rx))
    }
}

#[async_trait]
impl VideoTrack for ChannelTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn recv(&mut self) -> Option<VideoFrame> {
        self.frames.recv().await
    }
}
