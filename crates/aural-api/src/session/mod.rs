//! Session registry and peer lifecycle.
//!
//! One [`Session`] per signaling client. The registry lock only guards
//! bookkeeping: peer I/O (negotiation, close) always happens after the lock
//! has been released.

mod channel;
mod supervisor;
mod track;

pub use channel::{result_channel, ResultReceiver, ResultSender};
pub use supervisor::{CleanupSupervisor, CLEANUP_INTERVAL};
pub use track::run_track;

use std::collections::HashMap;
use std::sync::Arc;

use aural_models::{IceCandidate, PeerState, SessionDescription, SessionId, SessionState};
use aural_rtc::{PeerConnection, PeerConnector, PeerEvent, VideoTrack};
use aural_vision::{FrameProcessor, InferenceEngine, PipelineConfig};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::metrics;

/// Buffered peer events per connection.
const PEER_EVENT_BUFFER: usize = 32;

/// The live peer connection of a session.
struct PeerSlot {
    connection: Arc<dyn PeerConnection>,
    forwarder: JoinHandle<()>,
}

impl PeerSlot {
    /// Stop listening to the peer, then close it. Events raised by the close
    /// itself are never dispatched.
    async fn close(self, session_id: &SessionId) {
        self.forwarder.abort();
        if let Err(e) = self.connection.close().await {
            warn!(session_id = %session_id, error = %e, "Failed to close peer connection");
        }
    }
}

/// Registry record of one signaling client.
struct Session {
    state: SessionState,
    /// Generation of the most recent negotiation; peer events carrying an
    /// older one are dropped.
    generation: u64,
    peer: Option<PeerSlot>,
    data_channel: Option<String>,
    pipeline: Option<JoinHandle<()>>,
    results: ResultSender,
}

impl Session {
    fn new(results: ResultSender) -> Self {
        Self {
            state: SessionState::Connected,
            generation: 0,
            peer: None,
            data_channel: None,
            pipeline: None,
            results,
        }
    }

    fn peer_state(&self) -> Option<PeerState> {
        self.peer.as_ref().map(|p| p.connection.connection_state())
    }

    /// Detach everything that talks to the current peer.
    fn take_media(&mut self) -> Option<PeerSlot> {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.abort();
        }
        self.data_channel = None;
        self.peer.take()
    }

    /// Release the session's resources. Called after removal from the registry.
    async fn shutdown(mut self, session_id: SessionId) {
        if let Some(peer) = self.take_media() {
            peer.close(&session_id).await;
        }
        debug!(session_id = %session_id, state = %self.state.as_str(), "Session released");
    }
}

/// Process-wide registry of signaling sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    connector: Arc<dyn PeerConnector>,
    engine: Arc<InferenceEngine>,
    pipeline: PipelineConfig,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        engine: Arc<InferenceEngine>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            connector,
            engine,
            pipeline,
        }
    }

    /// Register a new client.
    pub async fn connect(&self) -> (SessionId, ResultReceiver) {
        let id = SessionId::new();
        let (sender, receiver) = result_channel();

        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id.clone(), Session::new(sender));
            sessions.len()
        };
        metrics::set_active_sessions(count);

        info!(session_id = %id, "Client connected");
        (id, receiver)
    }

    /// Remove a client and close its peer connection.
    pub async fn disconnect(&self, id: &SessionId) {
        let (removed, count) = {
            let mut sessions = self.sessions.write().await;
            let removed = sessions.remove(id);
            (removed, sessions.len())
        };
        metrics::set_active_sessions(count);

        match removed {
            Some(mut session) => {
                session.state = SessionState::Closing;
                metrics::record_session_removed("disconnect");
                info!(session_id = %id, "Client disconnected");
                session.shutdown(id.clone()).await;
            }
            None => debug!(session_id = %id, "Disconnect for session already removed"),
        }
    }

    /// Negotiate a new peer connection from the client's offer and return
    /// the local answer.
    ///
    /// Any existing peer is closed first. On failure the new peer is closed
    /// and the session is not promoted.
    pub async fn handle_offer(
        self: &Arc<Self>,
        id: &SessionId,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SessionError> {
        let (previous, generation, fallback_state) = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| SessionError::unknown_session(id))?;

            let previous = session.take_media();
            // With the old peer gone there is nothing left to be active
            let fallback_state = if previous.is_some() {
                SessionState::Connected
            } else {
                session.state
            };
            session.generation += 1;
            session.state = SessionState::Negotiating;
            (previous, session.generation, fallback_state)
        };

        if let Some(previous) = previous {
            info!(session_id = %id, "Closing previous peer connection before renegotiation");
            previous.close(id).await;
        }

        let (events_tx, events_rx) = mpsc::channel(PEER_EVENT_BUFFER);
        let connection = match self.connector.create(events_tx).await {
            Ok(connection) => connection,
            Err(e) => {
                self.restore_state(id, generation, fallback_state).await;
                metrics::record_offer("failed");
                return Err(e.into());
            }
        };
        let forwarder = self.spawn_event_forwarder(id.clone(), generation, events_rx);

        let answer = match negotiate(connection.as_ref(), offer).await {
            Ok(answer) => answer,
            Err(e) => {
                PeerSlot {
                    connection,
                    forwarder,
                }
                .close(id)
                .await;
                self.restore_state(id, generation, fallback_state).await;
                metrics::record_offer("failed");
                return Err(e);
            }
        };

        let slot = PeerSlot {
            connection,
            forwarder,
        };
        let orphan = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                Some(session) if session.generation == generation => {
                    session.peer = Some(slot);
                    None
                }
                _ => Some(slot),
            }
        };

        if let Some(orphan) = orphan {
            // Client left or renegotiated while this offer was in progress
            orphan.close(id).await;
            return Err(SessionError::unknown_session(id));
        }

        metrics::record_offer("answered");
        info!(session_id = %id, generation, "Peer connection negotiated");
        Ok(answer)
    }

    /// Apply a remote answer. Only meaningful when a peer exists.
    pub async fn handle_answer(
        &self,
        id: &SessionId,
        answer: SessionDescription,
    ) -> Result<(), SessionError> {
        let connection = self.current_peer(id).await?;
        connection.set_remote_description(answer).await?;
        Ok(())
    }

    /// Forward a remote ICE candidate to the session's peer.
    pub async fn handle_ice_candidate(
        &self,
        id: &SessionId,
        candidate: IceCandidate,
    ) -> Result<(), SessionError> {
        let connection = self.current_peer(id).await?;
        connection.add_ice_candidate(candidate).await?;
        Ok(())
    }

    /// Dispatch an event raised by the peer of negotiation `generation`.
    pub async fn on_peer_event(&self, id: &SessionId, generation: u64, event: PeerEvent) {
        debug!(session_id = %id, generation, event = event.kind(), "Peer event");
        match event {
            PeerEvent::Track(track) => self.attach_track(id, generation, track).await,
            PeerEvent::DataChannel { label } => {
                let mut sessions = self.sessions.write().await;
                let Some(session) = current(&mut sessions, id, generation) else {
                    debug!(session_id = %id, generation, "Ignoring data channel from stale peer");
                    return;
                };
                info!(session_id = %id, label = %label, "Data channel opened");
                session.data_channel = Some(label);
                session.state = SessionState::Active;
            }
            PeerEvent::StateChanged(state) => self.peer_state_changed(id, generation, state).await,
        }
    }

    /// Remove every session whose peer reports `failed` or `closed`.
    /// Returns the number of sessions removed.
    pub async fn remove_terminated(&self) -> usize {
        let (removed, count) = {
            let mut sessions = self.sessions.write().await;
            let dead: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.peer_state().is_some_and(|state| state.is_terminal()))
                .map(|(id, _)| id.clone())
                .collect();
            let removed: Vec<(SessionId, Session)> = dead
                .into_iter()
                .filter_map(|id| sessions.remove_entry(&id))
                .collect();
            (removed, sessions.len())
        };
        metrics::set_active_sessions(count);

        let total = removed.len();
        for (id, mut session) in removed {
            session.state = SessionState::Failed;
            metrics::record_session_removed("cleanup");
            info!(session_id = %id, "Removing session with dead peer connection");
            session.shutdown(id).await;
        }
        total
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Number of sessions currently holding a peer connection.
    pub async fn peer_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.peer.is_some())
            .count()
    }

    pub async fn session_state(&self, id: &SessionId) -> Option<SessionState> {
        self.sessions.read().await.get(id).map(|s| s.state)
    }

    pub async fn data_channel(&self, id: &SessionId) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|s| s.data_channel.clone())
    }

    /// Close every session. Used on shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<(SessionId, Session)> =
            self.sessions.write().await.drain().collect();
        metrics::set_active_sessions(0);
        for (id, session) in drained {
            session.shutdown(id).await;
        }
    }

    async fn current_peer(&self, id: &SessionId) -> Result<Arc<dyn PeerConnection>, SessionError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(id)
            .ok_or_else(|| SessionError::unknown_session(id))?;
        session
            .peer
            .as_ref()
            .map(|p| Arc::clone(&p.connection))
            .ok_or_else(|| SessionError::no_peer_connection(id))
    }

    async fn restore_state(&self, id: &SessionId, generation: u64, state: SessionState) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = current(&mut sessions, id, generation) {
            session.state = state;
        }
    }

    fn spawn_event_forwarder(
        self: &Arc<Self>,
        id: SessionId,
        generation: u64,
        mut events: mpsc::Receiver<PeerEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.on_peer_event(&id, generation, event).await;
            }
        })
    }

    async fn attach_track(&self, id: &SessionId, generation: u64, track: Box<dyn VideoTrack>) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = current(&mut sessions, id, generation) else {
            debug!(session_id = %id, generation, "Ignoring track from stale peer");
            return;
        };

        if let Some(previous) = session.pipeline.take() {
            previous.abort();
        }

        let processor = FrameProcessor::new(
            id.clone(),
            Arc::clone(&self.engine),
            Arc::new(session.results.clone()),
            &self.pipeline,
        );
        session.pipeline = Some(tokio::spawn(run_track(track, processor)));
        session.state = SessionState::Active;
    }

    async fn peer_state_changed(&self, id: &SessionId, generation: u64, state: PeerState) {
        match state {
            PeerState::Failed | PeerState::Closed => {
                let (removed, count) = {
                    let mut sessions = self.sessions.write().await;
                    if current(&mut sessions, id, generation).is_none() {
                        debug!(session_id = %id, generation, state = %state, "Ignoring state of stale peer");
                        return;
                    }
                    (sessions.remove(id), sessions.len())
                };
                metrics::set_active_sessions(count);

                if let Some(mut session) = removed {
                    session.state = if state == PeerState::Failed {
                        SessionState::Failed
                    } else {
                        SessionState::Closing
                    };
                    metrics::record_session_removed("peer_state");
                    info!(session_id = %id, state = %state, "Peer connection ended, removing session");
                    // Teardown aborts the forwarder running this call
                    tokio::spawn(session.shutdown(id.clone()));
                }
            }
            PeerState::Disconnected => {
                warn!(session_id = %id, "Peer connection disconnected");
            }
            other => {
                debug!(session_id = %id, state = %other, "Peer connection state changed");
            }
        }
    }
}

/// The session if `generation` is still its current negotiation.
fn current<'a>(
    sessions: &'a mut HashMap<SessionId, Session>,
    id: &SessionId,
    generation: u64,
) -> Option<&'a mut Session> {
    sessions.get_mut(id).filter(|s| s.generation == generation)
}

async fn negotiate(
    connection: &dyn PeerConnection,
    offer: SessionDescription,
) -> Result<SessionDescription, SessionError> {
    connection.set_remote_description(offer).await?;
    Ok(connection.create_answer().await?)
}
