//! Error types shared across the client.
//!
//! None of these are fatal. Callers turn them into a log line, a status
//! change, or a transient notice.

use thiserror::Error;

/// Why an outbound message was refused before it reached the transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    Empty,
    #[error("message is {len} characters, the limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("not connected to the server")]
    NotConnected,
    #[error("session identity not established yet")]
    NoIdentity,
    #[error("transmission failed: {0}")]
    Transport(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Problems with an inbound frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("malformed `{kind}` frame: {detail}")]
    InvalidBody { kind: String, detail: String },
}

/// Failures of the key-value persistence backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend unavailable")]
    Unavailable,
    #[error("storage write failed: {0}")]
    Write(String),
    #[error("stored value could not be encoded: {0}")]
    Encode(String),
}
