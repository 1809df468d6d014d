//! Detector and pose estimator contracts.
//!
//! Both are synchronous and potentially slow (tens to hundreds of ms); the
//! pipeline calls them on the blocking pool and never more often than its
//! throttle allows.

#[cfg(feature = "onnx")]
pub mod pose;
#[cfg(feature = "onnx")]
pub mod yolo;

use std::collections::HashMap;

use aural_models::BoundingBox;

use crate::error::VisionResult;
use crate::frame::VideoFrame;

#[cfg(feature = "onnx")]
pub use pose::{YoloPoseConfig, YoloPoseDetector};
#[cfg(feature = "onnx")]
pub use yolo::{YoloConfig, YoloDetector};

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Detector output before confidence filtering and distance estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    /// Pixel coordinates in the source frame
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Object detector contract.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &VideoFrame) -> VisionResult<Vec<RawDetection>>;
}

/// Landmarks the pipeline reads from a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkKind {
    Nose,
    LeftShoulder,
    RightShoulder,
}

/// One 2D landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Visibility confidence in [0, 1]
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }
}

/// Set of named landmarks for the most prominent person in a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseLandmarks {
    landmarks: HashMap<LandmarkKind, Landmark>,
}

impl PoseLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: LandmarkKind, landmark: Landmark) -> Self {
        self.landmarks.insert(kind, landmark);
        self
    }

    pub fn get(&self, kind: LandmarkKind) -> Option<&Landmark> {
        self.landmarks.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Pose estimator contract. `Ok(None)` means no person was found.
pub trait PoseEstimator: Send + Sync {
    fn estimate_pose(&self, frame: &VideoFrame) -> VisionResult<Option<PoseLandmarks>>;
}

/// Pose estimator used when no pose model is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPose;

impl PoseEstimator for DisabledPose {
    fn estimate_pose(&self, _frame: &VideoFrame) -> VisionResult<Option<PoseLandmarks>> {
        Ok(None)
    }
}
