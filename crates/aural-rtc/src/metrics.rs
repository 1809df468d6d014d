//! Media-path metrics.

use metrics::counter;

pub mod names {
    pub const PEERS_CREATED_TOTAL: &str = "aural_peers_created_total";
    pub const RTP_PACKETS_TOTAL: &str = "aural_rtp_packets_total";
    pub const FRAMES_DECODED_TOTAL: &str = "aural_frames_decoded_total";
    pub const MEDIA_DROPPED_TOTAL: &str = "aural_media_dropped_total";
    pub const DECODE_ERRORS_TOTAL: &str = "aural_decode_errors_total";
}

pub fn record_peer_created() {
    counter!(names::PEERS_CREATED_TOTAL).increment(1);
}

pub fn record_rtp_packet() {
    counter!(names::RTP_PACKETS_TOTAL).increment(1);
}

pub fn record_frame_decoded() {
    counter!(names::FRAMES_DECODED_TOTAL).increment(1);
}

/// `stage` is `sample` (ahead of the decoder) or `frame` (ahead of the pipeline).
pub fn record_media_dropped(stage: &'static str) {
    counter!(names::MEDIA_DROPPED_TOTAL, "stage" => stage).increment(1);
}

pub fn record_decode_error() {
    counter!(names::DECODE_ERRORS_TOTAL).increment(1);
}
