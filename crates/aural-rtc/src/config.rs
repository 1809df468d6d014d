//! Peer connection settings.

use std::time::Duration;

/// Public STUN server used when none is configured.
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// ICE servers offered to every peer connection
    pub stun_urls: Vec<String>,
    /// How far behind (in packets) the depacketizer waits for reordering
    pub max_late_packets: u16,
    /// Interval between keyframe requests sent upstream
    pub keyframe_interval: Duration,
    /// Decoded frames buffered between the decoder and the pipeline
    pub frame_buffer: usize,
    /// Encoded access units buffered ahead of the decoder
    pub sample_buffer: usize,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec![DEFAULT_STUN_URL.to_string()],
            max_late_packets: 256,
            keyframe_interval: Duration::from_secs(3),
            frame_buffer: 4,
            sample_buffer: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RtcConfig::default();
        assert_eq!(config.stun_urls, vec![DEFAULT_STUN_URL]);
        assert_eq!(config.keyframe_interval, Duration::from_secs(3));
        assert!(config.sample_buffer > config.frame_buffer);
    }
}
