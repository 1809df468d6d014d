//! H.264 decoding on a dedicated thread.

use std::sync::mpsc as std_mpsc;
use std::thread;

use aural_vision::VideoFrame;
use bytes::Bytes;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{RtcError, RtcResult};
use crate::metrics;

/// Annex-B access units in, RGB frames out.
pub struct H264Decoder {
    inner: Decoder,
}

impl H264Decoder {
    pub fn new() -> RtcResult<Self> {
        let inner = Decoder::new().map_err(|e| RtcError::decoder(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Decode one access unit. Returns the last picture it completed, if any.
    pub fn decode(&mut self, access_unit: &[u8]) -> RtcResult<Option<VideoFrame>> {
        let mut latest = None;
        for nal in openh264::nal_units(access_unit) {
            let Some(yuv) = self
                .inner
                .decode(nal)
                .map_err(|e| RtcError::decoder(e.to_string()))?
            else {
                continue;
            };

            let (width, height) = yuv.dimensions();
            let mut rgb = vec![0u8; width * height * 3];
            yuv.write_rgb8(&mut rgb);

            let frame = VideoFrame::from_rgb(width as u32, height as u32, rgb)
                .map_err(|e| RtcError::decoder(e.to_string()))?;
            latest = Some(frame);
        }
        Ok(latest)
    }
}

/// Start the decode thread for one track.
///
/// The thread exits when `samples` is disconnected or the frame receiver is
/// dropped.
pub fn spawn(
    track_id: String,
    samples: std_mpsc::Receiver<Bytes>,
    frames: mpsc::Sender<VideoFrame>,
) -> RtcResult<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("h264-{}", track_id))
        .spawn(move || decode_loop(&track_id, samples, frames))
        .map_err(|e| RtcError::decoder(format!("failed to start decode thread: {}", e)))
}

fn decode_loop(
    track_id: &str,
    samples: std_mpsc::Receiver<Bytes>,
    frames: mpsc::Sender<VideoFrame>,
) {
    let mut decoder = match H264Decoder::new() {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!(track_id = %track_id, error = %e, "Failed to create H.264 decoder");
            return;
        }
    };

    info!(track_id = %track_id, "Decode thread started");

    while let Ok(sample) = samples.recv() {
        let frame = match decoder.decode(&sample) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => {
                // Expected until the first keyframe arrives
                debug!(track_id = %track_id, error = %e, "Dropping undecodable access unit");
                metrics::record_decode_error();
                continue;
            }
        };

        metrics::record_frame_decoded();
        match frames.try_send(frame) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => metrics::record_media_dropped("frame"),
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }

    info!(track_id = %track_id, "Decode thread stopped");
}
