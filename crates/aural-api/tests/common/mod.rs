//! Fakes shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aural_api::{AppState, ServerConfig, SessionManager};
use aural_models::{BoundingBox, IceCandidate, PeerState, SessionDescription};
use aural_rtc::{PeerConnection, PeerConnector, PeerEvent, RtcError, RtcResult};
use aural_vision::{
    DisabledPose, InferenceEngine, ObjectDetector, PipelineConfig, RawDetection, VideoFrame,
    VisionResult,
};
use tokio::sync::mpsc;

pub const FAKE_ANSWER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=fake\r\n";

/// Offers whose SDP contains this marker are rejected.
pub const MALFORMED_MARKER: &str = "malformed";

pub struct FakePeer {
    state: Mutex<PeerState>,
    closed: AtomicBool,
    candidates: Mutex<Vec<IceCandidate>>,
    remote: Mutex<Vec<SessionDescription>>,
}

impl FakePeer {
    fn new() -> Self {
        Self {
            state: Mutex::new(PeerState::New),
            closed: AtomicBool::new(false),
            candidates: Mutex::new(Vec::new()),
            remote: Mutex::new(Vec::new()),
        }
    }

    pub fn set_state(&self, state: PeerState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn set_remote_description(&self, description: SessionDescription) -> RtcResult<()> {
        if description.sdp.contains(MALFORMED_MARKER) {
            return Err(RtcError::invalid_sdp("unparseable session description"));
        }
        self.remote.lock().unwrap().push(description);
        Ok(())
    }

    async fn create_answer(&self) -> RtcResult<SessionDescription> {
        self.set_state(PeerState::Connecting);
        Ok(SessionDescription::answer(FAKE_ANSWER_SDP))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> RtcResult<()> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    fn connection_state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }

    async fn close(&self) -> RtcResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.set_state(PeerState::Closed);
        Ok(())
    }
}

/// Records every peer it creates together with its event sender.
#[derive(Default)]
pub struct FakeConnector {
    peers: Mutex<Vec<(Arc<FakePeer>, mpsc::Sender<PeerEvent>)>>,
}

impl FakeConnector {
    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn peer(&self, index: usize) -> Arc<FakePeer> {
        Arc::clone(&self.peers.lock().unwrap()[index].0)
    }

    pub fn events(&self, index: usize) -> mpsc::Sender<PeerEvent> {
        self.peers.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> RtcResult<Arc<dyn PeerConnection>> {
        let peer = Arc::new(FakePeer::new());
        self.peers.lock().unwrap().push((Arc::clone(&peer), events));
        Ok(peer as Arc<dyn PeerConnection>)
    }
}

/// Detector that always sees one chair.
pub struct ChairDetector;

impl ObjectDetector for ChairDetector {
    fn detect(&self, _frame: &VideoFrame) -> VisionResult<Vec<RawDetection>> {
        Ok(vec![RawDetection::new(
            "chair",
            0.87,
            BoundingBox::new(100, 140, 260, 340),
        )])
    }
}

pub fn engine() -> Arc<InferenceEngine> {
    Arc::new(InferenceEngine::new(
        Arc::new(ChairDetector),
        Arc::new(DisabledPose),
        0.4,
    ))
}

pub fn manager() -> (Arc<SessionManager>, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::default());
    let manager = Arc::new(SessionManager::new(
        connector.clone(),
        engine(),
        PipelineConfig::default(),
    ));
    (manager, connector)
}

pub fn app_state() -> (AppState, Arc<FakeConnector>) {
    app_state_with(ServerConfig::default())
}

pub fn app_state_with(config: ServerConfig) -> (AppState, Arc<FakeConnector>) {
    let connector = Arc::new(FakeConnector::default());
    let state = AppState::new(config, connector.clone(), engine());
    (state, connector)
}

pub fn offer() -> SessionDescription {
    SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 102\r\n")
}
