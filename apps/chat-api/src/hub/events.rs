//! Outbound event envelopes and inbound client frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Values of the envelope `type` field.
pub struct EventType;

impl EventType {
    pub const MESSAGE: &'static str = "message";
    pub const TYPING: &'static str = "typing";
    pub const READ: &'static str = "read";
    pub const PRESENCE: &'static str = "presence";
    pub const CONVERSATION_CREATED: &'static str = "conversation_created";
}

/// Presence status used when the client does not send one.
pub const DEFAULT_STATUS: &str = "online";

// ---------------------------------------------------------------------------
// Server → Client envelopes
// ---------------------------------------------------------------------------

/// Generic event envelope. Type-specific fields are flattened next to the
/// common ones.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub conversation_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: &'static str, conversation_id: &str, user_id: &str) -> Self {
        Self {
            kind,
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn typing(conversation_id: &str, user_id: &str, stopped: bool) -> Self {
        let envelope = Self::new(EventType::TYPING, conversation_id, user_id);
        if stopped {
            envelope.with_field("stopped", true)
        } else {
            envelope
        }
    }

    pub fn read(conversation_id: &str, user_id: &str, last_read_id: Option<Value>) -> Self {
        let envelope = Self::new(EventType::READ, conversation_id, user_id);
        match last_read_id {
            Some(id) => envelope.with_field("last_read_id", id),
            None => envelope,
        }
    }

    pub fn presence(conversation_id: &str, user_id: &str, status: &str) -> Self {
        Self::new(EventType::PRESENCE, conversation_id, user_id).with_field("status", status)
    }
}

/// A persisted record tagged with an event type, e.g. a `message` envelope
/// carrying the full message row.
#[derive(Debug, Serialize)]
pub struct RecordEvent<'a, T: Serialize> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub record: &'a T,
}

impl<'a, T: Serialize> RecordEvent<'a, T> {
    pub fn message(record: &'a T) -> Self {
        Self {
            kind: EventType::MESSAGE,
            record,
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server frames
// ---------------------------------------------------------------------------

/// A frame received from a client, parsed once at the router boundary.
///
/// Clients also echo `conversation_id`/`user_id`; those are ignored in favour
/// of the connection's own identity.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Typing {
        #[serde(default)]
        stopped: bool,
    },
    Read {
        /// `Some` whenever the key is present, `Some(Value::Null)` included.
        #[serde(default, deserialize_with = "present")]
        last_read_id: Option<Value>,
    },
    Presence {
        #[serde(default)]
        status: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// Keeps an explicit `null` instead of folding it into "absent".
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_known_frames() {
        assert_eq!(
            ClientFrame::parse(br#"{"type":"typing"}"#).unwrap(),
            ClientFrame::Typing { stopped: false }
        );
        assert_eq!(
            ClientFrame::parse(br#"{"type":"typing","stopped":true,"user_id":"x"}"#).unwrap(),
            ClientFrame::Typing { stopped: true }
        );
        assert_eq!(
            ClientFrame::parse(br#"{"type":"read","last_read_id":"m-42"}"#).unwrap(),
            ClientFrame::Read {
                last_read_id: Some(json!("m-42"))
            }
        );
        assert_eq!(
            ClientFrame::parse(br#"{"type":"presence"}"#).unwrap(),
            ClientFrame::Presence { status: None }
        );
    }

    #[test]
    fn read_keeps_explicit_null_apart_from_absent() {
        assert_eq!(
            ClientFrame::parse(br#"{"type":"read","last_read_id":null}"#).unwrap(),
            ClientFrame::Read {
                last_read_id: Some(Value::Null)
            }
        );
        assert_eq!(
            ClientFrame::parse(br#"{"type":"read"}"#).unwrap(),
            ClientFrame::Read { last_read_id: None }
        );

        let value = serde_json::to_value(Envelope::read("r1", "u1", Some(Value::Null))).unwrap();
        assert_eq!(value.get("last_read_id"), Some(&Value::Null));
    }

    #[test]
    fn unknown_type_maps_to_unknown_variant() {
        assert_eq!(
            ClientFrame::parse(br#"{"type":"shout","body":"hi"}"#).unwrap(),
            ClientFrame::Unknown
        );
    }

    #[test]
    fn missing_type_or_bad_json_is_an_error() {
        assert!(ClientFrame::parse(br#"{"status":"online"}"#).is_err());
        assert!(ClientFrame::parse(b"not json").is_err());
    }

    #[test]
    fn read_envelope_carries_last_read_id_verbatim() {
        let value = serde_json::to_value(Envelope::read("r1", "u1", Some(json!(42)))).unwrap();
        assert_eq!(value["type"], "read");
        assert_eq!(value["conversation_id"], "r1");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["last_read_id"], 42);
        assert!(value["timestamp"].is_string());

        let value = serde_json::to_value(Envelope::read("r1", "u1", None)).unwrap();
        assert!(value.get("last_read_id").is_none());
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let value = serde_json::to_value(Envelope::typing("r1", "u1", false)).unwrap();
        let ts = value["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(value.get("stopped").is_none());
    }

    #[test]
    fn record_event_flattens_the_record() {
        let record = json!({ "id": "msg_1", "body": "hi" });
        let value = serde_json::to_value(RecordEvent::message(&record)).unwrap();
        assert_eq!(value, json!({ "type": "message", "id": "msg_1", "body": "hi" }));
    }
}
