//! Chat wire protocol.
//!
//! Every frame is a JSON object discriminated by a `type` field. The server
//! sends `init`, `message`, `history` and `error`; the client sends `message`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ProtocolError;
use crate::models::ChatMessage;

/// Path of the chat endpoint on the server host.
pub const WS_PATH: &str = "/ws";

/// Longest message text the server accepts.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// A message as the server serializes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub text: String,
    pub connection_id: String,
    pub user_message_number: i64,
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Convert into the client model. `received_at` stands in for a missing
    /// `created_at`. Authorship is unknown here; the message store sets
    /// `is_local_origin`.
    pub fn into_message(self, received_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            text: self.text,
            origin_id: self.connection_id,
            sequence_number: Some(self.user_message_number),
            created_at: self.created_at.unwrap_or(received_at),
            is_local_origin: false,
            server_id: self.id,
        }
    }
}

/// Frames pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    /// Sent once per connection: the assigned identity plus recent history.
    Init {
        connection_id: String,
        #[serde(default, deserialize_with = "deserialize_optional_batch")]
        history: Option<Vec<WireMessage>>,
    },
    Message(WireMessage),
    History {
        #[serde(deserialize_with = "deserialize_batch")]
        messages: Vec<WireMessage>,
    },
    Error {
        message: String,
    },
}

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    Message { text: String },
}

impl ClientCommand {
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(ServerEvent),
    /// A well-formed frame whose `type` this client does not handle.
    Unknown(String),
}

const KNOWN_KINDS: [&str; 4] = ["init", "message", "history", "error"];

/// Decode a text frame from the server.
pub fn parse_frame(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Ok(Inbound::Unknown(kind));
    }

    serde_json::from_value::<ServerEvent>(value)
        .map(Inbound::Event)
        .map_err(|e| ProtocolError::InvalidBody {
            kind,
            detail: e.to_string(),
        })
}

/// Parse an RFC 3339 timestamp, or a naive ISO timestamp read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
    }
}

/// History batches are read entry by entry. Entries that are not valid
/// messages are dropped; the rest of the frame still applies.
fn deserialize_batch<'de, D>(deserializer: D) -> Result<Vec<WireMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(valid_entries(raw))
}

fn deserialize_optional_batch<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<WireMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw.map(valid_entries))
}

fn valid_entries(raw: Vec<serde_json::Value>) -> Vec<WireMessage> {
    raw.into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn parses_init_with_history() {
        let raw = r#"{"type":"init","connection_id":"abc","history":[
            {"type":"message","id":7,"text":"a","connection_id":"x","user_message_number":1,
             "created_at":"2024-05-01T10:00:00+00:00"}]}"#;
        let Inbound::Event(ServerEvent::Init {
            connection_id,
            history,
        }) = parse_frame(raw).unwrap()
        else {
            panic!("expected init");
        };
        assert_eq!(connection_id, "abc");
        let history = history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, Some(7));
        assert_eq!(
            history[0].created_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn init_without_history_is_accepted() {
        let parsed = parse_frame(r#"{"type":"init","connection_id":"abc"}"#).unwrap();
        assert_eq!(
            parsed,
            Inbound::Event(ServerEvent::Init {
                connection_id: "abc".into(),
                history: None
            })
        );
    }

    #[test]
    fn bad_history_entries_are_dropped_not_the_frame() {
        let raw = r#"{"type":"init","connection_id":"abc","history":[
            {"text":"ok","connection_id":"x","user_message_number":1},
            {"text":"no number","connection_id":"x"},
            {"text":"bad time","connection_id":"x","user_message_number":2,"created_at":"soon"},
            "junk"
        ]}"#;
        let Inbound::Event(ServerEvent::Init {
            connection_id,
            history,
        }) = parse_frame(raw).unwrap()
        else {
            panic!("expected init");
        };
        assert_eq!(connection_id, "abc");
        let history = history.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "ok");

        let raw = r#"{"type":"history","messages":[{"text":"?"},
            {"text":"ok","connection_id":"x","user_message_number":3}]}"#;
        let Inbound::Event(ServerEvent::History { messages }) = parse_frame(raw).unwrap() else {
            panic!("expected history");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].user_message_number, 3);
    }

    #[test]
    fn message_without_timestamp_uses_receive_time() {
        let raw = r#"{"type":"message","text":"hi","connection_id":"abc","user_message_number":1}"#;
        let Inbound::Event(ServerEvent::Message(wire)) = parse_frame(raw).unwrap() else {
            panic!("expected message");
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let msg = wire.into_message(now);
        assert_eq!(msg.created_at, now);
        assert_eq!(msg.sequence_number, Some(1));
        assert_eq!(msg.origin_id, "abc");
        assert!(!msg.is_local_origin);
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        assert_eq!(
            parse_timestamp("2024-05-01T10:00:00.250000"),
            Some(
                Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
                    + chrono::Duration::milliseconds(250)
            )
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn unknown_type_is_reported_not_rejected() {
        assert_eq!(
            parse_frame(r#"{"type":"typing","who":"x"}"#).unwrap(),
            Inbound::Unknown("typing".into())
        );
    }

    #[rstest]
    #[case::not_json("hello")]
    #[case::no_type(r#"{"text":"hi"}"#)]
    #[case::numeric_type(r#"{"type":3}"#)]
    #[case::error_without_message(r#"{"type":"error"}"#)]
    #[case::history_not_a_list(r#"{"type":"history","messages":{}}"#)]
    #[case::bad_timestamp(
        r#"{"type":"message","text":"a","connection_id":"x","user_message_number":1,"created_at":"soon"}"#
    )]
    fn malformed_frames_are_errors(#[case] raw: &str) {
        assert!(parse_frame(raw).is_err());
    }

    #[test]
    fn outbound_message_carries_type() {
        let frame = ClientCommand::Message { text: "hi".into() }.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, serde_json::json!({"type": "message", "text": "hi"}));
    }
}
