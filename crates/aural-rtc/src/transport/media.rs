//! Inbound track handling: relay RTP back to the client and feed the decoder.

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info};
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::packet::Packet as RtcpPacket;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::{decoder, H264_CLOCK_RATE};
use crate::config::RtcConfig;
use crate::error::RtcResult;
use crate::metrics;
use crate::peer::ChannelTrack;

/// Start relaying and decoding a remote video track.
///
/// Returns the decoded side as a [`ChannelTrack`]; it ends when the remote
/// track stops delivering packets.
pub fn attach(
    track: Arc<TrackRemote>,
    relay: Arc<TrackLocalStaticRTP>,
    peer: Weak<RTCPeerConnection>,
    config: &RtcConfig,
) -> RtcResult<ChannelTrack> {
    let track_id = track.id().to_string();
    let (frame_tx, video) = ChannelTrack::channel(track_id.clone(), config.frame_buffer);
    let (sample_tx, sample_rx) = std_mpsc::sync_channel::<Bytes>(config.sample_buffer.max(1));

    decoder::spawn(track_id.clone(), sample_rx, frame_tx)?;

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(request_keyframes(
        peer,
        track.ssrc(),
        config.keyframe_interval,
        stop_rx,
    ));
    tokio::spawn(pump(track, relay, sample_tx, config.max_late_packets, stop_tx));

    info!(track_id = %track_id, "Video track attached");
    Ok(video)
}

/// Read RTP until the track ends. `_stop` is dropped on return, which ends
/// the keyframe requester.
async fn pump(
    track: Arc<TrackRemote>,
    relay: Arc<TrackLocalStaticRTP>,
    samples: std_mpsc::SyncSender<Bytes>,
    max_late: u16,
    _stop: oneshot::Sender<()>,
) {
    let track_id = track.id().to_string();
    let mut builder = SampleBuilder::new(max_late, H264Packet::default(), H264_CLOCK_RATE);

    loop {
        let packet = match track.read_rtp().await {
            Ok((packet, _)) => packet,
            Err(e) => {
                debug!(track_id = %track_id, error = %e, "Track read ended");
                break;
            }
        };
        metrics::record_rtp_packet();

        if let Err(e) = relay.write_rtp(&packet).await {
            debug!(track_id = %track_id, error = %e, "Relay write failed");
        }

        builder.push(packet);
        while let Some(sample) = builder.pop() {
            match samples.try_send(sample.data) {
                Ok(()) => {}
                Err(std_mpsc::TrySendError::Full(_)) => metrics::record_media_dropped("sample"),
                Err(std_mpsc::TrySendError::Disconnected(_)) => {
                    debug!(track_id = %track_id, "Decoder gone, stopping track reader");
                    return;
                }
            }
        }
    }
}

/// Periodically ask the sender for a keyframe so a decoder that joined late
/// or lost packets can resynchronize.
async fn request_keyframes(
    peer: Weak<RTCPeerConnection>,
    media_ssrc: u32,
    every: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let Some(pc) = peer.upgrade() else { break };
                let packets: [Box<dyn RtcpPacket + Send + Sync>; 1] = [Box::new(PictureLossIndication {
                    sender_ssrc: 0,
                    media_ssrc,
                })];
                if let Err(e) = pc.write_rtcp(&packets).await {
                    debug!(media_ssrc, error = %e, "Keyframe request failed");
                    break;
                }
            }
        }
    }
}
