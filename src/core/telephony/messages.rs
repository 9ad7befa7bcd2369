//! Twilio Media Streams WebSocket message types.
//!
//! All frames are JSON text messages discriminated by the `event` field.
//!
//! # Protocol Overview
//!
//! Provider events (received by the bridge):
//! - connected - Socket established, no stream metadata yet
//! - start - Stream metadata, carries `streamSid`
//! - media - Caller audio chunk with a stream-relative timestamp
//! - mark - Playback reached a mark previously sent by the bridge
//! - stop - Stream ended
//!
//! Bridge events (sent to the provider):
//! - media - Audio to play to the caller
//! - mark - Marker acknowledged once preceding audio has played
//! - clear - Drop any buffered audio not yet played

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors produced while decoding telephony frames.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// The frame was not valid JSON or did not match the expected shape
    #[error("Malformed telephony frame: {0}")]
    MalformedFrame(String),
}

// =============================================================================
// Inbound events (provider -> bridge)
// =============================================================================

/// Events received from the telephony provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioInbound {
    /// Socket connected
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },

    /// Stream started
    Start {
        /// Top-level stream identifier (also present inside `start`)
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        /// Stream metadata
        start: StreamStart,
    },

    /// Caller audio
    Media {
        media: InboundMedia,
    },

    /// Mark acknowledgement
    Mark {
        #[serde(default)]
        mark: Option<MarkBody>,
    },

    /// Stream stopped
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },

    /// Any event type this bridge does not know about
    #[serde(other)]
    Unknown,
}

impl TwilioInbound {
    /// Event tag for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            TwilioInbound::Connected { .. } => "connected",
            TwilioInbound::Start { .. } => "start",
            TwilioInbound::Media { .. } => "media",
            TwilioInbound::Mark { .. } => "mark",
            TwilioInbound::Stop { .. } => "stop",
            TwilioInbound::Unknown => "unknown",
        }
    }
}

/// Metadata carried by the `start` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: String,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "accountSid", default)]
    pub account_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, String>,
}

/// Audio chunk carried by an inbound `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMedia {
    /// Milliseconds since the stream started
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: u64,
    /// Base64 audio, relayed as-is
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
}

/// Mark name container, shared by both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkBody {
    pub name: String,
}

/// Twilio sends the media timestamp as a string; older docs show a number.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Timestamp {
        Number(u64),
        Text(String),
    }

    match Timestamp::deserialize(deserializer)? {
        Timestamp::Number(n) => Ok(n),
        Timestamp::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Decode one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<TwilioInbound, TelephonyError> {
    serde_json::from_str(text).map_err(|e| TelephonyError::MalformedFrame(e.to_string()))
}

// =============================================================================
// Outbound events (bridge -> provider)
// =============================================================================

/// Events sent to the telephony provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TwilioOutbound {
    /// Audio to play to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },

    /// Playback marker
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkBody,
    },

    /// Discard buffered audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

/// Audio chunk carried by an outbound `media` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMedia {
    pub payload: String,
}

impl TwilioOutbound {
    pub fn media(stream_sid: &str, payload: String) -> Self {
        TwilioOutbound::Media {
            stream_sid: stream_sid.to_string(),
            media: OutboundMedia { payload },
        }
    }

    pub fn mark(stream_sid: &str, name: &str) -> Self {
        TwilioOutbound::Mark {
            stream_sid: stream_sid.to_string(),
            mark: MarkBody {
                name: name.to_string(),
            },
        }
    }

    pub fn clear(stream_sid: &str) -> Self {
        TwilioOutbound::Clear {
            stream_sid: stream_sid.to_string(),
        }
    }

    pub fn stream_sid(&self) -> &str {
        match self {
            TwilioOutbound::Media { stream_sid, .. }
            | TwilioOutbound::Mark { stream_sid, .. }
            | TwilioOutbound::Clear { stream_sid } => stream_sid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_parse_start() {
        let text = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "accountSid": "AC123",
                "streamSid": "MZ18ad3ab5a668481ce02b83e7395059f0",
                "callSid": "CA123",
                "tracks": ["inbound"],
                "mediaFormat": {"encoding": "audio/x-mulaw", "sampleRate": 8000, "channels": 1},
                "customParameters": {"to_number": "+15550001111"}
            },
            "streamSid": "MZ18ad3ab5a668481ce02b83e7395059f0"
        }"#;

        match parse_inbound(text).unwrap() {
            TwilioInbound::Start { start, stream_sid } => {
                assert_eq!(start.stream_sid, "MZ18ad3ab5a668481ce02b83e7395059f0");
                assert_eq!(start.call_sid.as_deref(), Some("CA123"));
                assert_eq!(stream_sid.as_deref(), Some(start.stream_sid.as_str()));
                assert_eq!(
                    start.custom_parameters.get("to_number").map(String::as_str),
                    Some("+15550001111")
                );
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_string_timestamp() {
        let text = r#"{"event":"media","streamSid":"SS1","media":{"track":"inbound","chunk":"2","timestamp":"5120","payload":"/v7+"}}"#;
        match parse_inbound(text).unwrap() {
            TwilioInbound::Media { media } => {
                assert_eq!(media.timestamp, 5120);
                assert_eq!(media.payload, "/v7+");
            }
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_parse_media_numeric_timestamp() {
        let text = r#"{"event":"media","media":{"timestamp":1200,"payload":"AAAA"}}"#;
        match parse_inbound(text).unwrap() {
            TwilioInbound::Media { media } => assert_eq!(media.timestamp, 1200),
            other => panic!("Wrong event type: {other:?}"),
        }
    }

    #[test]
    fn test_parse_mark_and_unknown() {
        let mark = parse_inbound(r#"{"event":"mark","streamSid":"SS1","mark":{"name":"responsePart"}}"#)
            .unwrap();
        assert!(matches!(mark, TwilioInbound::Mark { mark: Some(ref m) } if m.name == "responsePart"));

        let unknown = parse_inbound(r#"{"event":"dtmf","dtmf":{"digit":"1"}}"#).unwrap();
        assert!(matches!(unknown, TwilioInbound::Unknown));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_inbound("not json"),
            Err(TelephonyError::MalformedFrame(_))
        ));
        assert!(parse_inbound(r#"{"event":"media","media":{"timestamp":"abc","payload":""}}"#).is_err());
        assert!(parse_inbound(r#"{"payload":"missing tag"}"#).is_err());
    }

    #[test]
    fn test_outbound_wire_format() {
        let media: Value =
            serde_json::to_value(TwilioOutbound::media("SS1", "AQID".to_string())).unwrap();
        assert_eq!(
            media,
            json!({"event": "media", "streamSid": "SS1", "media": {"payload": "AQID"}})
        );

        let mark: Value = serde_json::to_value(TwilioOutbound::mark("SS1", "responsePart")).unwrap();
        assert_eq!(
            mark,
            json!({"event": "mark", "streamSid": "SS1", "mark": {"name": "responsePart"}})
        );

        let clear: Value = serde_json::to_value(TwilioOutbound::clear("SS1")).unwrap();
        assert_eq!(clear, json!({"event": "clear", "streamSid": "SS1"}));
    }
}
