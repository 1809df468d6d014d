//! Periodic removal of sessions whose peer connection has died.
//!
//! The fast path is the peer's own state-change event; this sweep covers
//! peers that fail without one, such as an abrupt network loss.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info};

use super::SessionManager;

/// Default interval between sweeps.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

pub struct CleanupSupervisor {
    sessions: Arc<SessionManager>,
    interval: Duration,
}

impl CleanupSupervisor {
    pub fn new(sessions: Arc<SessionManager>, interval: Duration) -> Self {
        Self { sessions, interval }
    }

    /// Start the sweep loop.
    ///
    /// Runs until the task is dropped; should be spawned as a background task.
    pub async fn run(&self) {
        info!("Starting cleanup supervisor (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = self.sweep_once().await;
            if removed > 0 {
                info!(removed, "Cleanup sweep removed dead sessions");
            } else {
                debug!("Cleanup sweep found nothing to remove");
            }
        }
    }

    /// Run one sweep. Returns the number of sessions removed.
    pub async fn sweep_once(&self) -> usize {
        self.sessions.remove_terminated().await
    }
}
