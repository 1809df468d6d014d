//! Throttled, asynchronous inference over a session's video frames.
//!
//! Frames flow through [`FrameProcessor::on_frame`] untouched. At most one
//! frame per detection interval is handed to the blocking pool for
//! inference, and never while the previous run is still executing. Finished
//! runs are delivered through a [`ResultSink`].

mod fps;
mod inference;
mod throttle;

pub use fps::{FpsWindow, FPS_WINDOW_CAPACITY};
pub use inference::{run_inference, InferenceEngine, InferenceOutcome, SkipReason};
pub use throttle::Throttle;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aural_models::{FrameResult, SessionId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::frame::VideoFrame;
use crate::metrics;

/// Default minimum time between two triggered runs.
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(200);

/// Default confidence cut-off.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;

/// Pipeline tuning shared by every session.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub detection_interval: Duration,
    pub min_confidence: f32,
    pub fps_window: usize,
    /// Runs slower than this are reported as skipped.
    pub inference_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            fps_window: FPS_WINDOW_CAPACITY,
            inference_timeout: None,
        }
    }
}

/// Destination for finished results.
pub trait ResultSink: Send + Sync {
    /// Deliver a result without waiting. Returns `false` when nobody is
    /// listening any more and the result was dropped.
    fn emit(&self, result: FrameResult) -> bool;
}

/// Per-track pipeline state. Owned by exactly one session's media loop.
pub struct FrameProcessor {
    session_id: SessionId,
    engine: Arc<InferenceEngine>,
    sink: Arc<dyn ResultSink>,
    throttle: Throttle,
    fps: Arc<Mutex<FpsWindow>>,
    in_flight: Arc<AtomicBool>,
    inference_timeout: Option<Duration>,
    pending: Option<JoinHandle<()>>,
}

impl FrameProcessor {
    pub fn new(
        session_id: SessionId,
        engine: Arc<InferenceEngine>,
        sink: Arc<dyn ResultSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            session_id,
            engine,
            sink,
            throttle: Throttle::new(config.detection_interval),
            fps: Arc::new(Mutex::new(FpsWindow::new(config.fps_window))),
            in_flight: Arc::new(AtomicBool::new(false)),
            inference_timeout: config.inference_timeout,
            pending: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Whether a run is currently executing.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Pass a frame through, possibly scheduling inference on it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn on_frame(&mut self, frame: VideoFrame) -> VideoFrame {
        self.on_frame_at(frame, Instant::now())
    }

    /// [`Self::on_frame`] with an explicit clock reading.
    pub fn on_frame_at(&mut self, frame: VideoFrame, now: Instant) -> VideoFrame {
        metrics::record_frame();

        if self.is_busy() {
            metrics::record_frame_skipped("busy");
            return frame;
        }
        if !self.throttle.try_acquire(now) {
            metrics::record_frame_skipped("interval");
            return frame;
        }

        self.in_flight.store(true, Ordering::Release);

        let session_id = self.session_id.clone();
        let engine = Arc::clone(&self.engine);
        let fps = Arc::clone(&self.fps);
        let sink = Arc::clone(&self.sink);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.inference_timeout;
        let input = frame.clone();

        self.pending = Some(tokio::spawn(async move {
            match run_inference(engine, fps, input, timeout).await {
                InferenceOutcome::Ready(result) => {
                    let delivered = sink.emit(result);
                    metrics::record_result_emitted(delivered);
                    if !delivered {
                        debug!(session_id = %session_id, "Result receiver gone, dropping result");
                    }
                }
                InferenceOutcome::Skipped(reason) => {
                    warn!(session_id = %session_id, reason = %reason, "Inference skipped");
                }
            }
            in_flight.store(false, Ordering::Release);
        }));

        frame
    }

    /// Wait for the most recently scheduled run to finish.
    pub async fn flush(&mut self) {
        if let Some(handle) = self.pending.take() {
            if let Err(e) = handle.await {
                warn!(session_id = %self.session_id, error = %e, "Inference task aborted");
                self.in_flight.store(false, Ordering::Release);
            }
        }
    }
}
