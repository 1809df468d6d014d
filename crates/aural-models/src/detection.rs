//! Detection result models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
///
/// Serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box height in pixels. May be zero or negative for degenerate boxes.
    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from(v: [i32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A single detected object as delivered to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label (COCO name)
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    /// Estimated distance in meters, `null` when no estimate is available
    pub distance: Option<f64>,
    /// Bounding box; absent for pose-derived entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<[i32; 4]>")]
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            distance: None,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_distance(mut self, distance: Option<f64>) -> Self {
        self.distance = distance;
        self
    }

    pub fn is_person(&self) -> bool {
        self.label == "person"
    }
}

/// Detections for one processed frame plus the current processing rate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FrameResult {
    pub detections: Vec<Detection>,
    pub fps: f64,
}
