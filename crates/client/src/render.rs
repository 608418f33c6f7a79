//! Plain-text presentation of chat state, used by the terminal binary.

use wschat_shared::ChatMessage;

use crate::stores::Notice;
use crate::ws::ConnectionState;

/// `#3 14:05 you: hello`, or `#… 14:05 you: hello (sending)` while provisional.
pub fn format_message(msg: &ChatMessage, own: bool) -> String {
    let number = msg
        .sequence_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "…".to_string());
    let who = if own { "you" } else { short_origin(&msg.origin_id) };
    let pending = if msg.is_provisional() { " (sending)" } else { "" };
    format!(
        "#{} {} {}: {}{}",
        number,
        msg.created_at.format("%H:%M"),
        who,
        msg.text,
        pending
    )
}

fn short_origin(origin: &str) -> &str {
    origin.get(..8).unwrap_or(origin)
}

pub fn format_status(state: ConnectionState) -> String {
    format!("[{}]", state.label())
}

/// What the user can do about `state`, if anything.
pub fn status_hint(state: ConnectionState) -> Option<&'static str> {
    match state {
        ConnectionState::Closed => Some("Type /reconnect to retry now."),
        ConnectionState::Failed => {
            Some("Gave up connecting. Restart wschat to try again, or /quit to exit.")
        }
        _ => None,
    }
}

pub fn format_notice(notice: &Notice) -> String {
    format!("Error: {}", notice.text)
}
