//! `webrtc-rs` backend.
//!
//! Each peer negotiates H.264 only. The inbound video track is relayed back
//! to the browser on an outbound track and decoded into frames for the
//! pipeline.

mod decoder;
mod media;

pub use decoder::H264Decoder;

use std::sync::Arc;

use async_trait::async_trait;
use aural_models::{IceCandidate, PeerState, SdpType, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use crate::config::RtcConfig;
use crate::error::{RtcError, RtcResult};
use crate::metrics;
use crate::peer::{PeerConnection, PeerConnector, PeerEvent};

pub(crate) const H264_CLOCK_RATE: u32 = 90_000;
const H264_PAYLOAD_TYPE: u8 = 102;
const H264_FMTP: &str = "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f";

/// Defaults applied to candidates that omit them.
const DEFAULT_SDP_MID: &str = "0";
const DEFAULT_SDP_MLINE_INDEX: u16 = 0;

fn h264_capability() -> RTCRtpCodecCapability {
    let feedback = |typ: &str, parameter: &str| RTCPFeedback {
        typ: typ.to_owned(),
        parameter: parameter.to_owned(),
    };
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: H264_CLOCK_RATE,
        channels: 0,
        sdp_fmtp_line: H264_FMTP.to_owned(),
        rtcp_feedback: vec![
            feedback("goog-remb", ""),
            feedback("ccm", "fir"),
            feedback("nack", ""),
            feedback("nack", "pli"),
        ],
    }
}

/// Map the transport's state onto the shared model.
pub fn peer_state(state: RTCPeerConnectionState) -> PeerState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => PeerState::New,
        RTCPeerConnectionState::Connecting => PeerState::Connecting,
        RTCPeerConnectionState::Connected => PeerState::Connected,
        RTCPeerConnectionState::Disconnected => PeerState::Disconnected,
        RTCPeerConnectionState::Failed => PeerState::Failed,
        RTCPeerConnectionState::Closed => PeerState::Closed,
    }
}

/// Creates `webrtc-rs` peer connections.
pub struct WebRtcConnector {
    config: RtcConfig,
}

impl WebRtcConnector {
    pub fn new(config: RtcConfig) -> Self {
        Self { config }
    }

    fn build_api(&self) -> RtcResult<API> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: h264_capability(),
                payload_type: H264_PAYLOAD_TYPE,
                ..Default::default()
            },
            RTPCodecType::Video,
        )?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        Ok(APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build())
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.stun_urls.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn create(&self, events: mpsc::Sender<PeerEvent>) -> RtcResult<Arc<dyn PeerConnection>> {
        let api = self.build_api()?;
        let pc = Arc::new(api.new_peer_connection(self.rtc_configuration()).await?);

        // Outbound track carrying the relayed inbound stream
        let relay = Arc::new(TrackLocalStaticRTP::new(
            h264_capability(),
            "video".to_owned(),
            "aural-relay".to_owned(),
        ));
        let sender = pc
            .add_track(Arc::clone(&relay) as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        // Drain RTCP so interceptors keep running
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let track_events = events.clone();
        let weak_pc = Arc::downgrade(&pc);
        let config = self.config.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let events = track_events.clone();
            let relay = Arc::clone(&relay);
            let peer = weak_pc.clone();
            let config = config.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    debug!(kind = %track.kind(), "Ignoring non-video track");
                    return;
                }
                info!(
                    track_id = %track.id(),
                    codec = %track.codec().capability.mime_type,
                    "Remote video track received"
                );
                match media::attach(track, relay, peer, &config) {
                    Ok(video) => {
                        if events.send(PeerEvent::Track(Box::new(video))).await.is_err() {
                            debug!("Peer event receiver gone, dropping track");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to attach video track"),
                }
            })
        }));

        let channel_events = events.clone();
        pc.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let events = channel_events.clone();
            let label = channel.label().to_owned();
            Box::pin(async move {
                let _ = events.send(PeerEvent::DataChannel { label }).await;
            })
        }));

        let state_events = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = state_events.clone();
            Box::pin(async move {
                let _ = events.send(PeerEvent::StateChanged(peer_state(state))).await;
            })
        }));

        metrics::record_peer_created();
        Ok(Arc::new(WebRtcPeer { inner: pc }))
    }
}

/// [`PeerConnection`] backed by an `RTCPeerConnection`.
pub struct WebRtcPeer {
    inner: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn set_remote_description(&self, description: SessionDescription) -> RtcResult<()> {
        let sdp = description.sdp;
        let remote = match description.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(sdp),
            SdpType::Answer => RTCSessionDescription::answer(sdp),
            SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
            SdpType::Rollback => {
                return Err(RtcError::invalid_sdp("rollback is not supported"));
            }
        }
        .map_err(|e| RtcError::invalid_sdp(e.to_string()))?;

        self.inner
            .set_remote_description(remote)
            .await
            .map_err(|e| RtcError::invalid_sdp(e.to_string()))
    }

    async fn create_answer(&self) -> RtcResult<SessionDescription> {
        let answer = self
            .inner
            .create_answer(None)
            .await
            .map_err(|e| RtcError::negotiation(e.to_string()))?;

        let mut gathering_complete = self.inner.gathering_complete_promise().await;
        self.inner
            .set_local_description(answer)
            .await
            .map_err(|e| RtcError::negotiation(e.to_string()))?;
        let _ = gathering_complete.recv().await;

        let local = self
            .inner
            .local_description()
            .await
            .ok_or_else(|| RtcError::negotiation("no local description after ICE gathering"))?;

        Ok(SessionDescription::answer(local.sdp))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> RtcResult<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: Some(
                candidate
                    .sdp_mid
                    .unwrap_or_else(|| DEFAULT_SDP_MID.to_owned()),
            ),
            sdp_mline_index: Some(candidate.sdp_mline_index.unwrap_or(DEFAULT_SDP_MLINE_INDEX)),
            username_fragment: None,
        };

        self.inner
            .add_ice_candidate(init)
            .await
            .map_err(|e| RtcError::invalid_candidate(e.to_string()))
    }

    fn connection_state(&self) -> PeerState {
        peer_state(self.inner.connection_state())
    }

    async fn close(&self) -> RtcResult<()> {
        self.inner.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_state_mapping() {
        assert_eq!(peer_state(RTCPeerConnectionState::Unspecified), PeerState::New);
        assert_eq!(peer_state(RTCPeerConnectionState::Connected), PeerState::Connected);
        assert_eq!(peer_state(RTCPeerConnectionState::Disconnected), PeerState::Disconnected);
        assert_eq!(peer_state(RTCPeerConnectionState::Failed), PeerState::Failed);
        assert_eq!(peer_state(RTCPeerConnectionState::Closed), PeerState::Closed);
    }

    #[test]
    fn test_h264_only_capability() {
        let capability = h264_capability();
        assert_eq!(capability.mime_type, MIME_TYPE_H264);
        assert_eq!(capability.clock_rate, 90_000);
        assert!(capability.sdp_fmtp_line.contains("packetization-mode=1"));
    }

    #[test]
    fn test_api_builds() {
        let connector = WebRtcConnector::new(RtcConfig::default());
        assert!(connector.build_api().is_ok());
    }

    #[tokio::test]
    async fn test_new_peer_starts_new() {
        let connector = WebRtcConnector::new(RtcConfig::default());
        let (tx, _rx) = mpsc::channel(8);
        let peer = connector.create(tx).await.unwrap();
        assert_eq!(peer.connection_state(), PeerState::New);
        peer.close().await.unwrap();
    }
}
