//! Decoded video frames handed to the detectors.

use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::{VisionError, VisionResult};

/// A decoded RGB8 frame.
///
/// Pixel data is reference counted so the pass-through path and an inference
/// run can share one frame without copying.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Build a frame from packed RGB8 bytes (`width * height * 3`).
    pub fn from_rgb(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> VisionResult<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 {
            return Err(VisionError::invalid_frame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        if data.len() != expected {
            return Err(VisionError::invalid_frame(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Solid black frame, mostly useful in tests.
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self {
            width,
            height,
            data: vec![0u8; len].into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy into an `image` buffer for preprocessing.
    pub fn to_image(&self) -> VisionResult<RgbImage> {
        ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(self.width, self.height, self.data.to_vec())
            .ok_or_else(|| VisionError::invalid_frame("failed to create image buffer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_wrong_length() {
        let err = VideoFrame::from_rgb(4, 4, vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, VisionError::InvalidFrame(_)));
    }

    #[test]
    fn test_rejects_empty_dimensions() {
        assert!(VideoFrame::from_rgb(0, 4, Vec::<u8>::new()).is_err());
    }

    #[test]
    fn test_clone_shares_pixels() {
        let frame = VideoFrame::blank(8, 6);
        let copy = frame.clone();
        assert_eq!(frame.data().as_ptr(), copy.data().as_ptr());
        assert_eq!(copy.to_image().unwrap().dimensions(), (8, 6));
    }
}
