//! Application state.

use std::sync::Arc;
use std::time::Instant;

use aural_rtc::PeerConnector;
use aural_vision::InferenceEngine;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::session::SessionManager;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<SessionManager>,
    pub limit: SessionLimit,
    pub started_at: Instant,
}

impl AppState {
    /// Build state around an already loaded detector and a peer factory.
    pub fn new(
        config: ServerConfig,
        connector: Arc<dyn PeerConnector>,
        engine: Arc<InferenceEngine>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(
            connector,
            engine,
            config.pipeline_config(),
        ));
        Self {
            limit: SessionLimit::new(config.max_sessions),
            config,
            sessions,
            started_at: Instant::now(),
        }
    }
}

/// Admission gate for signaling sessions. A slot is taken before the
/// WebSocket upgrade and released when the socket handler returns.
#[derive(Clone)]
pub struct SessionLimit {
    slots: Option<Arc<Semaphore>>,
}

/// A reserved session slot; dropping it frees the slot.
pub struct SessionSlot {
    _permit: Option<OwnedSemaphorePermit>,
}

impl SessionLimit {
    /// `max == 0` disables the limit.
    pub fn new(max: usize) -> Self {
        Self {
            slots: (max > 0).then(|| Arc::new(Semaphore::new(max))),
        }
    }

    /// Reserve a slot, or `None` when every slot is taken.
    pub fn try_reserve(&self) -> Option<SessionSlot> {
        match &self.slots {
            None => Some(SessionSlot { _permit: None }),
            Some(slots) => Arc::clone(slots)
                .try_acquire_owned()
                .ok()
                .map(|permit| SessionSlot {
                    _permit: Some(permit),
                }),
        }
    }
}
