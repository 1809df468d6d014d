//! Vision stage of the detection service.
//!
//! This crate provides:
//! - Decoded [`VideoFrame`]s shared between pass-through and inference
//! - Detector and pose estimator contracts, with YOLOv8 ONNX backends
//! - Pinhole-model distance estimation from boxes and shoulder landmarks
//! - The throttled [`FrameProcessor`] that schedules inference off the media path

pub mod detection;
pub mod distance;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod pipeline;

pub use detection::{
    DisabledPose, Landmark, LandmarkKind, ObjectDetector, PoseEstimator, PoseLandmarks,
    RawDetection, COCO_CLASSES,
};
#[cfg(feature = "onnx")]
pub use detection::{YoloConfig, YoloDetector, YoloPoseConfig, YoloPoseDetector};
pub use error::{VisionError, VisionResult};
pub use frame::VideoFrame;
pub use pipeline::{
    FrameProcessor, InferenceEngine, InferenceOutcome, PipelineConfig, ResultSink, SkipReason,
};
