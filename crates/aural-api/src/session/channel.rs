//! Per-session latest-value result channel.
//!
//! Only the newest [`FrameResult`] is kept. A result emitted before the
//! previous one was read replaces it; a result emitted after the receiver
//! is gone is discarded.

use std::sync::Arc;

use aural_models::FrameResult;
use aural_vision::ResultSink;
use tokio::sync::watch;

/// Create a connected sender/receiver pair.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = watch::channel(None);
    (
        ResultSender {
            inner: Arc::new(tx),
        },
        ResultReceiver { inner: rx },
    )
}

/// Producer side, held by the session and its pipeline.
#[derive(Clone)]
pub struct ResultSender {
    inner: Arc<watch::Sender<Option<FrameResult>>>,
}

impl ResultSender {
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl ResultSink for ResultSender {
    fn emit(&self, result: FrameResult) -> bool {
        self.inner.send(Some(result)).is_ok()
    }
}

/// Consumer side, held by the WebSocket writer.
pub struct ResultReceiver {
    inner: watch::Receiver<Option<FrameResult>>,
}

impl ResultReceiver {
    /// Wait for a result newer than the last one returned.
    ///
    /// Returns `None` once every sender is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<FrameResult> {
        loop {
            self.inner.changed().await.ok()?;
            if let Some(result) = self.inner.borrow_and_update().clone() {
                return Some(result);
            }
        }
    }

    /// Whether a result is waiting to be read.
    pub fn has_pending(&self) -> bool {
        self.inner.has_changed().unwrap_or(false)
    }
}
