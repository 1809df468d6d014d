//! One inference run: detect, filter, estimate distances, merge pose.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aural_models::{Detection, FrameResult};
use tracing::debug;

use super::fps::FpsWindow;
use crate::detection::{ObjectDetector, PoseEstimator};
use crate::distance;
use crate::error::{VisionError, VisionResult};
use crate::frame::VideoFrame;
use crate::metrics;

/// Detector + pose estimator pair with the confidence cut-off.
pub struct InferenceEngine {
    detector: Arc<dyn ObjectDetector>,
    pose: Arc<dyn PoseEstimator>,
    min_confidence: f32,
}

impl InferenceEngine {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        pose: Arc<dyn PoseEstimator>,
        min_confidence: f32,
    ) -> Self {
        Self {
            detector,
            pose,
            min_confidence,
        }
    }

    /// Run both models on a frame and assemble client-facing detections.
    pub fn analyze(&self, frame: &VideoFrame) -> VisionResult<Vec<Detection>> {
        let frame_height = f64::from(frame.height());
        let frame_width = f64::from(frame.width());

        let mut detections: Vec<Detection> = self
            .detector
            .detect(frame)?
            .into_iter()
            .filter(|raw| raw.confidence >= self.min_confidence)
            .map(|raw| {
                let distance =
                    distance::estimate(&raw.label, f64::from(raw.bbox.height()), frame_height);
                Detection::new(raw.label, raw.confidence)
                    .with_bbox(raw.bbox)
                    .with_distance(distance)
            })
            .collect();

        if let Some(pose) = self.pose.estimate_pose(frame)? {
            if let Some(person_m) = distance::estimate_from_shoulders(&pose, frame_width) {
                distance::merge_person_distance(&mut detections, person_m);
            }
        }

        Ok(detections)
    }
}

/// Why a triggered run produced no result.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Failed(String),
    Panicked,
    TimedOut(Duration),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Failed(msg) => write!(f, "inference failed: {}", msg),
            SkipReason::Panicked => f.write_str("inference panicked"),
            SkipReason::TimedOut(after) => write!(f, "inference timed out after {:?}", after),
        }
    }
}

impl SkipReason {
    fn metric_label(&self) -> &'static str {
        match self {
            SkipReason::Failed(_) => "failed",
            SkipReason::Panicked => "panicked",
            SkipReason::TimedOut(_) => "timed_out",
        }
    }
}

/// Result of a triggered run, consumed by the emit step.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Ready(FrameResult),
    Skipped(SkipReason),
}

/// Synchronous body of a run: detections plus the completion time.
fn infer_blocking(
    engine: &InferenceEngine,
    frame: &VideoFrame,
) -> VisionResult<(Vec<Detection>, Instant)> {
    let detections = engine.analyze(frame)?;
    Ok((detections, Instant::now()))
}

/// Record a delivered run in the FPS window and build its result. Runs that
/// end up skipped never reach the window.
fn complete_run(
    fps: &Mutex<FpsWindow>,
    detections: Vec<Detection>,
    finished: Instant,
) -> VisionResult<FrameResult> {
    let mut window = fps
        .lock()
        .map_err(|_| VisionError::internal("FPS window lock poisoned"))?;
    window.push(finished);
    Ok(FrameResult {
        detections,
        fps: window.fps(),
    })
}

/// Execute one run on the blocking pool, converting every failure into
/// [`InferenceOutcome::Skipped`].
///
/// With a timeout, a late run is reported as skipped once the deadline
/// passes, but this future still waits for the blocking work to finish so
/// runs of one session never overlap.
pub async fn run_inference(
    engine: Arc<InferenceEngine>,
    fps: Arc<Mutex<FpsWindow>>,
    frame: VideoFrame,
    timeout: Option<Duration>,
) -> InferenceOutcome {
    let started = Instant::now();
    let mut handle = tokio::task::spawn_blocking(move || infer_blocking(&engine, &frame));

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                let _ = handle.await;
                let reason = SkipReason::TimedOut(limit);
                metrics::record_inference(reason.metric_label(), started.elapsed().as_secs_f64());
                return InferenceOutcome::Skipped(reason);
            }
        },
        None => handle.await,
    };

    let outcome = match joined {
        Ok(Ok((detections, finished))) => match complete_run(&fps, detections, finished) {
            Ok(result) => InferenceOutcome::Ready(result),
            Err(e) => InferenceOutcome::Skipped(SkipReason::Failed(e.to_string())),
        },
        Ok(Err(e)) => InferenceOutcome::Skipped(SkipReason::Failed(e.to_string())),
        Err(_) => InferenceOutcome::Skipped(SkipReason::Panicked),
    };

    let label = match &outcome {
        InferenceOutcome::Ready(result) => {
            debug!(
                detections = result.detections.len(),
                fps = result.fps,
                "Inference run completed"
            );
            "ready"
        }
        InferenceOutcome::Skipped(reason) => reason.metric_label(),
    };
    metrics::record_inference(label, started.elapsed().as_secs_f64());

    outcome
}
