//! Media loop binding a decoded track to its frame processor.

use aural_rtc::VideoTrack;
use aural_vision::FrameProcessor;
use tracing::info;

/// Feed every frame of `track` through `processor` until the track ends.
pub async fn run_track(mut track: Box<dyn VideoTrack>, mut processor: FrameProcessor) {
    let session_id = processor.session_id().clone();
    info!(session_id = %session_id, track_id = %track.id(), "Frame pipeline attached");

    let mut frames = 0u64;
    while let Some(frame) = track.recv().await {
        // Outbound media is relayed at the RTP layer, the frame is not used further
        let _ = processor.on_frame(frame);
        frames += 1;
    }

    processor.flush().await;
    info!(session_id = %session_id, frames, "Video track ended");
}
