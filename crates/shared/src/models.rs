//! Domain models shared by the connection layer and the message store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Identity ---

/// Who issued a [`SessionIdentity`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Authority {
    /// Assigned by the server in an `init` frame. Valid for one connection.
    Server,
    /// Generated by the client. Survives reconnects and restarts.
    Local,
}

/// The identity that authors messages in this session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub id: String,
    pub authority: Authority,
}

impl SessionIdentity {
    pub fn server(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authority: Authority::Server,
        }
    }

    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            authority: Authority::Local,
        }
    }

    /// Generate a fresh client-side identity.
    pub fn generate_local() -> Self {
        Self::local(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_authoritative(&self) -> bool {
        self.authority == Authority::Server
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

// --- Messages ---

/// A chat message as held by the client.
///
/// `sequence_number` is the server's per-origin counter. A message without one
/// is provisional: it was sent by this client but not yet confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub origin_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    /// Written by this client. Set on provisional entries, and by the store
    /// when a message arrives from the identity current at that moment.
    #[serde(default)]
    pub is_local_origin: bool,
    /// Database id assigned by the server, when it sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
}

impl ChatMessage {
    /// A message sent by this client that the server has not numbered yet.
    pub fn provisional(
        text: impl Into<String>,
        origin_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            text: text.into(),
            origin_id: origin_id.into(),
            sequence_number: None,
            created_at,
            is_local_origin: true,
            server_id: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.sequence_number.is_none()
    }

    /// The `(origin, sequence)` pair that identifies a confirmed message.
    pub fn key(&self) -> Option<MessageKey<'_>> {
        self.sequence_number.map(|seq| MessageKey {
            origin_id: &self.origin_id,
            sequence_number: seq,
        })
    }
}

/// Dedup key for confirmed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey<'a> {
    pub origin_id: &'a str,
    pub sequence_number: i64,
}
