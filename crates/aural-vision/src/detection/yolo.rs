//! YOLOv8 object detector on ONNX Runtime.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (`cuda` feature)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use aural_models::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::{ObjectDetector, RawDetection, COCO_CLASSES};
use crate::error::{VisionError, VisionResult};
use crate::frame::VideoFrame;

const NUM_CLASSES: usize = 80;
/// Anchor-free candidates for a 640x640 input.
pub(super) const NUM_CANDIDATES: usize = 8400;
/// 4 box coordinates (cx, cy, w, h) + 80 class scores
const NUM_FEATURES: usize = 4 + NUM_CLASSES;

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct YoloConfig {
    /// Path to ONNX model file
    pub model_path: String,
    /// Candidates below this score are dropped before NMS
    pub score_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for YoloConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            score_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// Candidate box in model-input space, before scaling back to the frame.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    class_id: usize,
    score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// YOLOv8 detector. The ONNX session is not reentrant, so runs are serialized.
pub struct YoloDetector {
    session: Mutex<Session>,
    config: YoloConfig,
}

impl YoloDetector {
    /// Load the model. Fails if the file is missing or cannot be parsed.
    pub fn new(config: YoloConfig) -> VisionResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(VisionError::model_not_found(&config.model_path));
        }

        let session = Mutex::new(create_session(model_path)?);
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "YOLO detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Decode `[84, 8400]` into pixel boxes in the source frame.
    fn postprocess(
        &self,
        outputs: &[f32],
        frame_width: u32,
        frame_height: u32,
    ) -> VisionResult<Vec<RawDetection>> {
        if outputs.len() != NUM_FEATURES * NUM_CANDIDATES {
            return Err(VisionError::detection_failed(format!(
                "Unexpected output size: expected {}, got {}",
                NUM_FEATURES * NUM_CANDIDATES,
                outputs.len()
            )));
        }

        let grid = Array::from_shape_vec((NUM_FEATURES, NUM_CANDIDATES), outputs.to_vec())
            .map_err(|e| VisionError::internal(format!("Failed to reshape output: {}", e)))?;
        let rows = grid.t();

        let input_size = self.config.input_size as f32;
        let mut candidates = Vec::new();
        for i in 0..NUM_CANDIDATES {
            let (mut best_class, mut best_score) = (0usize, 0.0f32);
            for c in 0..NUM_CLASSES {
                let score = rows[[i, 4 + c]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < self.config.score_threshold {
                continue;
            }

            let (cx, cy, w, h) = (rows[[i, 0]], rows[[i, 1]], rows[[i, 2]], rows[[i, 3]]);
            candidates.push(Candidate {
                x1: (cx - w / 2.0).clamp(0.0, input_size),
                y1: (cy - h / 2.0).clamp(0.0, input_size),
                x2: (cx + w / 2.0).clamp(0.0, input_size),
                y2: (cy + h / 2.0).clamp(0.0, input_size),
                class_id: best_class,
                score: best_score,
            });
        }

        let scale_x = frame_width as f32 / input_size;
        let scale_y = frame_height as f32 / input_size;

        Ok(non_maximum_suppression(candidates, self.config.nms_threshold)
            .into_iter()
            .map(|c| {
                let label = COCO_CLASSES.get(c.class_id).copied().unwrap_or("unknown");
                let bbox = BoundingBox::new(
                    (c.x1 * scale_x) as i32,
                    (c.y1 * scale_y) as i32,
                    (c.x2 * scale_x) as i32,
                    (c.y2 * scale_y) as i32,
                );
                RawDetection::new(label, c.score, bbox)
            })
            .collect())
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, frame: &VideoFrame) -> VisionResult<Vec<RawDetection>> {
        let img = frame.to_image()?;
        let input = input_tensor(&img, self.config.input_size)?;
        let outputs = run_output(&self.session, input)?;
        let detections = self.postprocess(&outputs, frame.width(), frame.height())?;
        debug!(count = detections.len(), "YOLO detection completed");
        Ok(detections)
    }
}

/// Greedy per-class NMS, highest score first.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Resize to the square input, normalize to [0, 1], lay out as NCHW.
pub(super) fn input_tensor(img: &RgbImage, size: u32) -> VisionResult<Value> {
    let resized = image::imageops::resize(img, size, size, FilterType::Triangle);
    let (w, h) = (size as usize, size as usize);

    let mut chw: Vec<f32> = Vec::with_capacity(3 * h * w);
    for c in 0..3 {
        for y in 0..h {
            for x in 0..w {
                let pixel = resized.get_pixel(x as u32, y as u32);
                chw.push(pixel[c] as f32 / 255.0);
            }
        }
    }

    Tensor::from_array((vec![1usize, 3, h, w], chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| VisionError::internal(format!("Failed to create tensor: {}", e)))
}

/// Run a single-input model and flatten its `output0` tensor.
pub(super) fn run_output(session: &Mutex<Session>, input: Value) -> VisionResult<Vec<f32>> {
    let mut session = session
        .lock()
        .map_err(|_| VisionError::internal("Session lock poisoned"))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| VisionError::detection_failed(format!("ONNX inference failed: {}", e)))?;

    let output = outputs
        .get("output0")
        .ok_or_else(|| VisionError::detection_failed("Missing output0 tensor"))?;

    let tensor = output
        .try_extract_tensor::<f32>()
        .map_err(|e| VisionError::detection_failed(format!("Failed to extract tensor: {}", e)))?;

    Ok(tensor.1.iter().copied().collect())
}

pub(super) fn create_session(model_path: &Path) -> VisionResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| VisionError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| VisionError::internal(format!("Failed to load ONNX model: {}", e)))
}
