//! Wire messages exchanged with the analyzer
//!
//! Outbound: one text message per encoded frame, either a bare
//! `data:image/jpeg;base64,...` URL or a JSON envelope carrying the sequence
//! number and capture time alongside it.
//!
//! Inbound: one JSON object per eye-state observation,
//! `{"kind": "eyes_closed", "observed_at": "2024-05-01T12:00:00Z"}`.
//! `observed_at` is optional and defaults to the time of receipt.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::LinkError;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// One sampled, JPEG-encoded frame on its way to the analyzer
#[derive(Debug)]
pub struct Frame {
    /// Encoded image bytes
    pub payload: Vec<u8>,
    /// When the source image was captured
    pub captured_at: DateTime<Utc>,
    /// Per-sampler sequence number, starting at 0
    pub sequence: u64,
}

/// Observed eye state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    EyesClosed,
    EyesOpen,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::EyesClosed => "eyes_closed",
            SignalKind::EyesOpen => "eyes_open",
        }
    }
}

/// A discrete eye-state observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSignal {
    pub kind: SignalKind,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl AlertSignal {
    pub fn new(kind: SignalKind, observed_at: DateTime<Utc>) -> Self {
        Self { kind, observed_at }
    }

    pub fn eyes_closed() -> Self {
        Self::new(SignalKind::EyesClosed, Utc::now())
    }

    pub fn eyes_open() -> Self {
        Self::new(SignalKind::EyesOpen, Utc::now())
    }

    /// Decode an inbound analyzer message
    pub fn decode(text: &str) -> Result<Self, LinkError> {
        serde_json::from_str(text.trim()).map_err(|e| LinkError::Protocol(e.to_string()))
    }

    pub fn to_message(&self) -> Result<Message, LinkError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(|e| LinkError::Serialization(e.to_string()))
    }
}

/// Outbound frame encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Bare JPEG data URL
    #[default]
    DataUrl,
    /// JSON envelope with sequence and capture time
    Json,
}

#[derive(Debug, Serialize, Deserialize)]
struct FrameEnvelope {
    sequence: u64,
    captured_at: DateTime<Utc>,
    image: String,
}

impl FrameFormat {
    /// Encode a frame, consuming it
    pub fn encode(&self, frame: Frame) -> Result<Message, LinkError> {
        let data_url = to_data_url(&frame.payload);
        match self {
            FrameFormat::DataUrl => Ok(Message::Text(data_url)),
            FrameFormat::Json => {
                let envelope = FrameEnvelope {
                    sequence: frame.sequence,
                    captured_at: frame.captured_at,
                    image: data_url,
                };
                serde_json::to_string(&envelope)
                    .map(Message::Text)
                    .map_err(|e| LinkError::Serialization(e.to_string()))
            }
        }
    }
}

/// Wrap JPEG bytes in a data URL
pub fn to_data_url(jpeg: &[u8]) -> String {
    let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(DATA_URL_PREFIX);
    STANDARD.encode_string(jpeg, &mut url);
    url
}

/// Extract JPEG bytes from a data URL
#[cfg(test)]
fn from_data_url(url: &str) -> Result<Vec<u8>, LinkError> {
    let encoded = url
        .strip_prefix(DATA_URL_PREFIX)
        .ok_or_else(|| LinkError::Protocol("not a JPEG data URL".into()))?;
    STANDARD
        .decode(encoded)
        .map_err(|e| LinkError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame {
            payload: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
            captured_at: Utc::now(),
            sequence,
        }
    }

    #[test]
    fn test_data_url_format() {
        let msg = FrameFormat::DataUrl.encode(frame(0)).unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text message");
        };
        assert!(text.starts_with("data:image/jpeg;base64,"));
        assert_eq!(
            from_data_url(&text).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]
        );
    }

    #[test]
    fn test_data_url_rejects_other_media() {
        assert!(matches!(
            from_data_url("data:image/png;base64,AAAA"),
            Err(LinkError::Protocol(_))
        ));
    }

    #[test]
    fn test_json_envelope_carries_sequence() {
        let msg = FrameFormat::Json.encode(frame(42)).unwrap();
        let Message::Text(text) = msg else {
            panic!("expected text message");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["sequence"], 42);
        assert!(value["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_decode_signal_with_timestamp() {
        let signal =
            AlertSignal::decode(r#"{"kind":"eyes_closed","observed_at":"2024-05-01T12:00:00Z"}"#)
                .unwrap();
        assert_eq!(signal.kind, SignalKind::EyesClosed);
        assert_eq!(signal.observed_at.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_decode_signal_defaults_timestamp() {
        let before = Utc::now();
        let signal = AlertSignal::decode(r#"{"kind":"eyes_open"}"#).unwrap();
        assert_eq!(signal.kind, SignalKind::EyesOpen);
        assert!(signal.observed_at >= before);
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(matches!(
            AlertSignal::decode(r#"{"kind":"yawning"}"#),
            Err(LinkError::Protocol(_))
        ));
        assert!(AlertSignal::decode("not json").is_err());
    }
}
