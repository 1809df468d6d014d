//! Signaling message schemas.
//!
//! Every WebSocket frame is a JSON envelope `{"event": <name>, "data": <payload>}`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::FrameResult;
use crate::session::SessionId;

/// SDP message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }
}

/// Session description as exchanged with the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }
}

/// Remote ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// Messages sent by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Remote offer; answered with [`ServerMessage::Answer`]
    Offer(SessionDescription),
    /// Remote answer for a server-initiated offer
    Answer(SessionDescription),
    /// Trickled ICE candidate
    IceCandidate(IceCandidate),
}

impl ClientMessage {
    /// Event name used for logging and metrics labels.
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice_candidate",
        }
    }
}

/// Messages pushed to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Sent once when the session is registered
    #[serde(rename = "connected")]
    Connected { sid: SessionId },

    /// Local answer for the client's offer
    #[serde(rename = "answer")]
    Answer(SessionDescription),

    /// Negotiation or protocol error
    #[serde(rename = "error")]
    Error { message: String },

    /// Latest inference result for the session's video track
    #[serde(rename = "detection-results")]
    DetectionResults(FrameResult),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Answer(_) => "answer",
            ServerMessage::Error { .. } => "error",
            ServerMessage::DetectionResults(_) => "detection-results",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use serde_json::json;

    #[test]
    fn test_parse_offer_envelope() {
        let raw = json!({
            "event": "offer",
            "data": {"sdp": "v=0\r\n", "type": "offer"}
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg, ClientMessage::Offer(SessionDescription::offer("v=0\r\n")));
    }

    #[test]
    fn test_parse_ice_candidate_without_optional_fields() {
        let raw = json!({
            "event": "ice_candidate",
            "data": {"candidate": "candidate:1 1 UDP 2122252543 10.0.0.2 50000 typ host"}
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        match msg {
            ClientMessage::IceCandidate(c) => {
                assert!(c.sdp_mid.is_none());
                assert!(c.sdp_mline_index.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_ice_candidate_camel_case_fields() {
        let raw = json!({
            "event": "ice_candidate",
            "data": {"candidate": "c", "sdpMid": "0", "sdpMLineIndex": 1}
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::IceCandidate(IceCandidate {
                candidate: "c".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(1),
            })
        );
    }

    #[test]
    fn test_unknown_event_rejected() {
        let raw = json!({"event": "bogus", "data": {}});
        assert!(serde_json::from_value::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn test_detection_results_shape() {
        let msg = ServerMessage::DetectionResults(FrameResult {
            detections: vec![Detection::new("bottle", 0.5)],
            fps: 4.5,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "detection-results");
        assert_eq!(json["data"]["fps"], 4.5);
        assert_eq!(json["data"]["detections"][0]["label"], "bottle");
    }

    #[test]
    fn test_error_shape() {
        let json = serde_json::to_value(ServerMessage::error("bad sdp")).unwrap();
        assert_eq!(json, json!({"event": "error", "data": {"message": "bad sdp"}}));
    }
}
