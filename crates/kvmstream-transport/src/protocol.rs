//! Media WebSocket sub-protocol.
//!
//! # Binary messages (one WebSocket frame each)
//!
//! ```text
//! [0]      kind      u8   0xFF = pong, 0x01 = video
//! video only:
//! [1]      keyframe  u8   non-zero = keyframe
//! [2..]    payload   [u8] H.264 access unit (Annex B)
//! ```
//!
//! Outbound ping is a single `0x00` byte.
//!
//! # Control messages (text frames)
//!
//! ```text
//! ← {"event_type": "media", "event": {"video": {"h264": {"profile_level_id": "42e01f"}}}}
//! → {"event_type": "start", "event": {"type": "video", "format": "h264"}}
//! ```

use bytes::Bytes;
use kvmstream_core::TransportError;
use serde::{Deserialize, Serialize};

// ── Binary framing ────────────────────────────────────────────────────────────

pub const KIND_VIDEO: u8 = 0x01;
pub const KIND_PONG: u8 = 0xFF;

/// Outbound liveness probe.
pub const PING: [u8; 1] = [0x00];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryMessage {
    Pong,
    Video { keyframe: bool, payload: Bytes },
}

impl BinaryMessage {
    pub fn parse(data: Bytes) -> Result<Self, TransportError> {
        match data.first().copied() {
            None => Err(TransportError::Malformed { reason: "empty binary message".into() }),
            Some(KIND_PONG) => Ok(Self::Pong),
            Some(KIND_VIDEO) => {
                let keyframe = *data.get(1).ok_or_else(|| TransportError::Malformed {
                    reason: "video message without keyframe flag".into(),
                })?;
                Ok(Self::Video { keyframe: keyframe != 0, payload: data.slice(2..) })
            }
            Some(kind) => Err(TransportError::Malformed {
                reason: format!("unknown binary message kind 0x{kind:02x}"),
            }),
        }
    }
}

// ── Control messages ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct H264Offer {
    pub profile_level_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoOffer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h264: Option<H264Offer>,
}

/// Formats the server can stream.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MediaOffer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoOffer>,
}

impl MediaOffer {
    pub fn h264(&self) -> Option<&H264Offer> {
        self.video.as_ref().and_then(|v| v.h264.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Media(MediaOffer),
    /// An event this client does not handle (e.g. HID events sharing the socket).
    Other(String),
}

#[derive(Deserialize)]
struct Envelope {
    event_type: String,
    #[serde(default)]
    event: serde_json::Value,
}

impl ServerEvent {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| TransportError::Malformed { reason: e.to_string() })?;
        match envelope.event_type.as_str() {
            "media" => serde_json::from_value(envelope.event)
                .map(Self::Media)
                .map_err(|e| TransportError::Malformed { reason: format!("media event: {e}") }),
            _ => Ok(Self::Other(envelope.event_type)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Start(StartRequest),
}

impl ClientEvent {
    /// Asks the server to switch the socket into H.264 streaming.
    pub fn start_h264() -> Self {
        Self::Start(StartRequest { kind: "video".into(), format: "h264".into() })
    }

    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Malformed { reason: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pong_and_video() {
        assert_eq!(BinaryMessage::parse(Bytes::from_static(&[0xFF])).unwrap(), BinaryMessage::Pong);

        let msg = BinaryMessage::parse(Bytes::from_static(&[0x01, 0x01, 0xAA, 0xBB])).unwrap();
        assert_eq!(
            msg,
            BinaryMessage::Video { keyframe: true, payload: Bytes::from_static(&[0xAA, 0xBB]) }
        );

        let msg = BinaryMessage::parse(Bytes::from_static(&[0x01, 0x00, 0xCC])).unwrap();
        assert!(matches!(msg, BinaryMessage::Video { keyframe: false, .. }));
    }

    #[test]
    fn any_nonzero_flag_is_a_keyframe() {
        let msg = BinaryMessage::parse(Bytes::from_static(&[0x01, 0x7F])).unwrap();
        assert_eq!(msg, BinaryMessage::Video { keyframe: true, payload: Bytes::new() });
    }

    #[test]
    fn rejects_malformed_binary() {
        assert!(BinaryMessage::parse(Bytes::new()).is_err());
        assert!(BinaryMessage::parse(Bytes::from_static(&[0x01])).is_err());
        assert!(BinaryMessage::parse(Bytes::from_static(&[0x02, 0x00])).is_err());
    }

    #[test]
    fn parses_media_offer() {
        let text = r#"{"event_type": "media", "event": {"video": {"h264": {"profile_level_id": "42E01F"}}}}"#;
        let ServerEvent::Media(offer) = ServerEvent::parse(text).unwrap() else {
            panic!("expected media event");
        };
        assert_eq!(offer.h264().unwrap().profile_level_id, "42E01F");
    }

    #[test]
    fn media_offer_without_h264() {
        let text = r#"{"event_type": "media", "event": {"video": {}}}"#;
        let ServerEvent::Media(offer) = ServerEvent::parse(text).unwrap() else {
            panic!("expected media event");
        };
        assert!(offer.h264().is_none());

        let text = r#"{"event_type": "media", "event": {}}"#;
        assert!(matches!(ServerEvent::parse(text).unwrap(), ServerEvent::Media(ref o) if o.h264().is_none()));
    }

    #[test]
    fn unknown_events_are_passed_through() {
        let text = r#"{"event_type": "hid_state", "event": {"online": true}}"#;
        assert_eq!(ServerEvent::parse(text).unwrap(), ServerEvent::Other("hid_state".into()));
        assert!(ServerEvent::parse("not json").is_err());
    }

    #[test]
    fn start_request_wire_shape() {
        let json = ClientEvent::start_h264().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event_type": "start", "event": {"type": "video", "format": "h264"}})
        );
    }
}
