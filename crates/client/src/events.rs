//! Effects requested by the core and events surfaced to the renderer.
//!
//! The core never performs I/O itself. Every reaction returns a list of
//! [`Effect`]s; a driver (native or wasm) executes them in order and feeds
//! the resulting transport, timer and user events back in.

use std::time::Duration;

use url::Url;
use wschat_shared::ChatMessage;

use crate::stores::{Notice, StoreChange};
use crate::ws::ConnectionState;

/// Something the driver must do on behalf of the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a transport connection to `url`.
    Connect { url: Url },
    /// Send a text frame on the open connection.
    Transmit { payload: String },
    /// Call back with `token` after `delay`.
    ScheduleReconnect { delay: Duration, token: u64 },
    /// Call back with `id` after `delay` to dismiss a notice.
    ScheduleNoticeExpiry { id: u64, delay: Duration },
    /// Hand an event to the presentation layer.
    Emit(ChatEvent),
}

/// What the presentation layer is told about.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// The connection state changed. Emitted exactly once per transition.
    Status(ConnectionState),
    /// The server assigned this session an identity.
    IdentityAssigned(String),
    /// The message log changed. `log` is the whole log after the change.
    Messages {
        change: StoreChange,
        log: Vec<MessageView>,
    },
    NoticeShown(Notice),
    NoticeDismissed(u64),
}

/// A message plus whether the current identity authored it, evaluated when
/// the event was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub message: ChatMessage,
    pub own: bool,
}
