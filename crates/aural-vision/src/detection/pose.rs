//! YOLOv8-pose estimator on ONNX Runtime.
//!
//! Reads the highest scoring person and converts its COCO keypoints into
//! [`PoseLandmarks`] with normalized coordinates. Keypoint confidence is
//! used as visibility.

use std::path::Path;
use std::sync::Mutex;

use ndarray::ArrayView2;
use ort::session::Session;
use tracing::{debug, info};

use super::yolo::{create_session, input_tensor, run_output, NUM_CANDIDATES};
use super::{Landmark, LandmarkKind, PoseEstimator, PoseLandmarks};
use crate::error::{VisionError, VisionResult};
use crate::frame::VideoFrame;

const NUM_KEYPOINTS: usize = 17;
/// 4 box coordinates + person score + 17 x (x, y, confidence)
const POSE_FEATURES: usize = 5 + NUM_KEYPOINTS * 3;
const SCORE_INDEX: usize = 4;

// COCO keypoint indices
const KP_NOSE: usize = 0;
const KP_LEFT_SHOULDER: usize = 5;
const KP_RIGHT_SHOULDER: usize = 6;

#[derive(Debug, Clone)]
pub struct YoloPoseConfig {
    /// Path to a yolov8-pose ONNX model
    pub model_path: String,
    /// People scoring below this are ignored
    pub score_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for YoloPoseConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n-pose.onnx".to_string(),
            score_threshold: 0.5,
            input_size: 640,
        }
    }
}

pub struct YoloPoseDetector {
    session: Mutex<Session>,
    config: YoloPoseConfig,
}

impl YoloPoseDetector {
    /// Load the model. Fails if the file is missing or cannot be parsed.
    pub fn new(config: YoloPoseConfig) -> VisionResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(VisionError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(model_path = %config.model_path, "YOLO pose estimator initialized");

        Ok(Self { session, config })
    }
}

impl PoseEstimator for YoloPoseDetector {
    fn estimate_pose(&self, frame: &VideoFrame) -> VisionResult<Option<PoseLandmarks>> {
        let img = frame.to_image()?;
        let input = input_tensor(&img, self.config.input_size)?;
        let outputs = run_output(&self.session, input)
            .map_err(|e| VisionError::pose_failed(e.to_string()))?;
        let pose = decode_pose(
            &outputs,
            self.config.input_size as f32,
            self.config.score_threshold,
        )?;
        debug!(found = pose.is_some(), "YOLO pose estimation completed");
        Ok(pose)
    }
}

/// Decode `[56, 8400]` into the landmarks of the best scoring person.
///
/// The input is stretched to a square without letterboxing, so dividing by
/// the input size yields coordinates normalized to the source frame.
fn decode_pose(
    outputs: &[f32],
    input_size: f32,
    score_threshold: f32,
) -> VisionResult<Option<PoseLandmarks>> {
    let grid = ArrayView2::from_shape((POSE_FEATURES, NUM_CANDIDATES), outputs).map_err(|_| {
        VisionError::pose_failed(format!(
            "Unexpected output size: expected {}, got {}",
            POSE_FEATURES * NUM_CANDIDATES,
            outputs.len()
        ))
    })?;

    let best = (0..NUM_CANDIDATES)
        .map(|i| (i, grid[[SCORE_INDEX, i]]))
        .filter(|(_, score)| *score >= score_threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1));
    let Some((person, _)) = best else {
        return Ok(None);
    };

    let keypoint = |k: usize| {
        let base = SCORE_INDEX + 1 + k * 3;
        Landmark::new(
            grid[[base, person]] / input_size,
            grid[[base + 1, person]] / input_size,
            grid[[base + 2, person]],
        )
    };

    Ok(Some(
        PoseLandmarks::new()
            .with(LandmarkKind::Nose, keypoint(KP_NOSE))
            .with(LandmarkKind::LeftShoulder, keypoint(KP_LEFT_SHOULDER))
            .with(LandmarkKind::RightShoulder, keypoint(KP_RIGHT_SHOULDER)),
    ))
}
