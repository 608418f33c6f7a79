//! Connection lifecycle with bounded, linear reconnect backoff.
//!
//! [`ConnectionManager`] is the state machine only. It is driven by the
//! platform driver (`connection_native` or `connection_wasm`), which performs
//! the [`Effect`]s it returns and reports transport events back.
//!
//! ```text
//! Idle --connect--> Connecting --open--> Open --close--> Closed
//!                       ^                                   |
//!                       +------ timer (retries < budget) ---+
//!                                                           |
//!                                  retries == budget ---> Failed
//! ```

use std::time::Duration;

use url::Url;
use wschat_shared::{parse_frame, ClientCommand, Inbound, SendError, ServerEvent};

use crate::events::{ChatEvent, Effect};

/// Connection state for the chat socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
    /// Retry budget exhausted. Terminal.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed)
    }

    /// Text for the status indicator.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "Idle",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Open => "Connected",
            ConnectionState::Closed => "Disconnected",
            ConnectionState::Failed => "Could not connect",
        }
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Reconnect attempts allowed after a close before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt; attempt `n` waits `n` times this
    pub base_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// State machine for the single chat connection.
#[derive(Debug)]
pub struct ConnectionManager {
    endpoint: Url,
    state: ConnectionState,
    reconnect: ReconnectConfig,
    retry_count: u32,
    max_message_len: usize,
    /// Server-assigned identity for the current connection.
    connection_id: Option<String>,
    next_token: u64,
    pending_timer: Option<u64>,
}

impl ConnectionManager {
    pub fn new(endpoint: Url, reconnect: ReconnectConfig, max_message_len: usize) -> Self {
        Self {
            endpoint,
            state: ConnectionState::Idle,
            reconnect,
            retry_count: 0,
            max_message_len,
            connection_id: None,
            next_token: 0,
            pending_timer: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Open and identified: outbound messages will be accepted.
    pub fn is_ready(&self) -> bool {
        self.state.is_connected() && self.connection_id.is_some()
    }

    fn transition(&mut self, next: ConnectionState, effects: &mut Vec<Effect>) {
        if self.state == next {
            return;
        }
        crate::log_debug!("Connection state {:?} -> {:?}", self.state, next);
        self.state = next;
        effects.push(Effect::Emit(ChatEvent::Status(next)));
    }

    /// Start a connection attempt. Only valid from `Idle` or `Closed`.
    pub fn connect(&mut self) -> Vec<Effect> {
        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Closed) {
            crate::log_debug!("connect() ignored in state {:?}", self.state);
            return Vec::new();
        }

        // Any timer still in flight is superseded by this attempt.
        self.pending_timer = None;

        let mut effects = Vec::new();
        crate::log_info!("Connecting to {}", self.endpoint);
        self.transition(ConnectionState::Connecting, &mut effects);
        effects.push(Effect::Connect {
            url: self.endpoint.clone(),
        });
        effects
    }

    /// Manual reconnect while waiting out a backoff delay.
    pub fn reconnect_now(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Closed {
            crate::log_debug!("reconnect_now() ignored in state {:?}", self.state);
            return Vec::new();
        }
        crate::log_info!("Manual reconnect requested");
        self.connect()
    }

    pub fn on_open(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            crate::log_warn!("Unexpected open event in state {:?}", self.state);
            return Vec::new();
        }
        let mut effects = Vec::new();
        self.retry_count = 0;
        crate::log_info!("WebSocket connected to {}", self.endpoint);
        self.transition(ConnectionState::Open, &mut effects);
        effects
    }

    /// Decode an inbound frame. Malformed and unknown frames are logged and dropped.
    pub fn on_message(&mut self, raw: &str) -> Option<ServerEvent> {
        match parse_frame(raw) {
            Ok(Inbound::Event(event)) => {
                if let ServerEvent::Init { connection_id, .. } = &event {
                    crate::log_info!("Assigned connection id {}", connection_id);
                    self.connection_id = Some(connection_id.clone());
                }
                Some(event)
            }
            Ok(Inbound::Unknown(kind)) => {
                crate::log_warn!("Ignoring frame with unknown type `{}`", kind);
                None
            }
            Err(e) => {
                crate::log_error!("Dropping malformed frame: {}", e);
                None
            }
        }
    }

    /// The transport closed, or a connection attempt failed.
    pub fn on_close(&mut self, code: Option<u16>, reason: &str) -> Vec<Effect> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {}
            state => {
                crate::log_debug!("Close event ignored in state {:?}", state);
                return Vec::new();
            }
        }

        crate::log_info!(
            "WebSocket to {} closed (code {:?}): {}",
            self.endpoint,
            code,
            reason
        );
        let mut effects = Vec::new();
        self.connection_id = None;
        self.transition(ConnectionState::Closed, &mut effects);

        if self.retry_count < self.reconnect.max_attempts {
            self.retry_count += 1;
            let delay = self.reconnect.delay_for_attempt(self.retry_count);
            self.next_token += 1;
            let token = self.next_token;
            self.pending_timer = Some(token);
            crate::log_info!(
                "Reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                self.retry_count,
                self.reconnect.max_attempts
            );
            effects.push(Effect::ScheduleReconnect { delay, token });
        } else {
            crate::log_error!(
                "Giving up after {} reconnect attempts",
                self.reconnect.max_attempts
            );
            self.transition(ConnectionState::Failed, &mut effects);
        }
        effects
    }

    /// A reconnect timer fired. Stale tokens are ignored.
    pub fn on_reconnect_timer(&mut self, token: u64) -> Vec<Effect> {
        if self.pending_timer != Some(token) || self.state != ConnectionState::Closed {
            crate::log_debug!("Stale reconnect timer {} ignored", token);
            return Vec::new();
        }
        self.connect()
    }

    /// Transport-level error report. Only close events move the state.
    pub fn on_transport_error(&mut self, detail: &str) {
        crate::log_warn!("WebSocket error: {}", detail);
    }

    /// Validate and encode an outbound message.
    pub fn send(&self, text: &str) -> Result<Effect, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::Empty);
        }
        let len = text.chars().count();
        if len > self.max_message_len {
            return Err(SendError::TooLong {
                len,
                max: self.max_message_len,
            });
        }
        if !self.state.is_connected() {
            return Err(SendError::NotConnected);
        }
        if self.connection_id.is_none() {
            return Err(SendError::NoIdentity);
        }

        let payload = ClientCommand::Message {
            text: text.to_string(),
        }
        .to_frame()
        .map_err(|e| SendError::Encode(e.to_string()))?;
        Ok(Effect::Transmit { payload })
    }

    /// A transmit effect failed. The connection state is left alone.
    pub fn on_send_failed(&self, detail: &str) -> SendError {
        crate::log_error!("Send failed: {}", detail);
        SendError::Transport(detail.to_string())
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WebChat;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::{run_chat, spawn_chat, ChatHandle, UserCommand};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const INIT: &str = r#"{"type":"init","connection_id":"abc","history":[]}"#;

    fn manager(budget: u32) -> ConnectionManager {
        ConnectionManager::new(
            Url::parse("ws://localhost:6088/ws").unwrap(),
            ReconnectConfig {
                max_attempts: budget,
                base_delay: Duration::from_millis(100),
            },
            1000,
        )
    }

    fn statuses(effects: &[Effect]) -> Vec<ConnectionState> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(ChatEvent::Status(s)) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn scheduled(effects: &[Effect]) -> Option<(Duration, u64)> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleReconnect { delay, token } => Some((*delay, *token)),
            _ => None,
        })
    }

    fn open_with_identity(m: &mut ConnectionManager) {
        m.connect();
        m.on_open();
        m.on_message(INIT);
    }

    #[test]
    fn connect_emits_connecting_and_connect_effect() {
        let mut m = manager(5);
        let effects = m.connect();
        assert_eq!(statuses(&effects), vec![ConnectionState::Connecting]);
        assert!(matches!(
            effects.last(),
            Some(Effect::Connect { url }) if url.as_str() == "ws://localhost:6088/ws"
        ));
    }

    #[test]
    fn budget_of_five_retries_then_fails() {
        let mut m = manager(5);
        m.connect();

        let mut delays = Vec::new();
        loop {
            let effects = m.on_close(Some(1006), "abnormal");
            match scheduled(&effects) {
                Some((delay, token)) => {
                    delays.push(delay);
                    let reconnect = m.on_reconnect_timer(token);
                    assert!(matches!(reconnect.last(), Some(Effect::Connect { .. })));
                }
                None => {
                    assert_eq!(
                        statuses(&effects),
                        vec![ConnectionState::Closed, ConnectionState::Failed]
                    );
                    break;
                }
            }
        }

        let expected: Vec<_> = (1..=5).map(|n| Duration::from_millis(100 * n)).collect();
        assert_eq!(delays, expected);
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.retry_count(), 5);

        // Terminal: nothing moves it and no sixth timer appears.
        assert!(m.on_close(None, "again").is_empty());
        assert!(m.connect().is_empty());
        assert!(m.reconnect_now().is_empty());
        assert_eq!(m.state(), ConnectionState::Failed);
    }

    #[test]
    fn open_resets_the_retry_count() {
        let mut m = manager(5);
        m.connect();
        let (_, token) = scheduled(&m.on_close(None, "drop")).unwrap();
        m.on_reconnect_timer(token);
        let (_, token) = scheduled(&m.on_close(None, "drop")).unwrap();
        m.on_reconnect_timer(token);
        assert_eq!(m.retry_count(), 2);

        m.on_open();
        assert_eq!(m.retry_count(), 0);
        let (delay, _) = scheduled(&m.on_close(None, "drop")).unwrap();
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn zero_budget_fails_on_first_close() {
        let mut m = manager(0);
        m.connect();
        m.on_open();
        let effects = m.on_close(Some(1000), "bye");
        assert!(scheduled(&effects).is_none());
        assert_eq!(m.state(), ConnectionState::Failed);
    }

    #[test]
    fn each_transition_reports_status_once() {
        let mut m = manager(2);
        assert_eq!(statuses(&m.connect()), vec![ConnectionState::Connecting]);
        assert_eq!(statuses(&m.on_open()), vec![ConnectionState::Open]);
        assert!(m.on_open().is_empty());
        let effects = m.on_close(None, "drop");
        assert_eq!(statuses(&effects), vec![ConnectionState::Closed]);
        assert!(m.on_close(None, "duplicate").is_empty());
    }

    #[test]
    fn stale_timer_does_not_reconnect() {
        let mut m = manager(5);
        m.connect();
        let (_, token) = scheduled(&m.on_close(None, "drop")).unwrap();
        assert!(m.on_reconnect_timer(token + 1).is_empty());
        assert_eq!(m.state(), ConnectionState::Closed);
    }

    #[test]
    fn manual_reconnect_supersedes_pending_timer() {
        let mut m = manager(5);
        m.connect();
        let (_, token) = scheduled(&m.on_close(None, "drop")).unwrap();

        let effects = m.reconnect_now();
        assert!(matches!(effects.last(), Some(Effect::Connect { .. })));
        assert_eq!(m.state(), ConnectionState::Connecting);

        // The original timer fires later and must not start a second attempt.
        assert!(m.on_reconnect_timer(token).is_empty());
    }

    #[test]
    fn send_requires_open_connection_and_identity() {
        let mut m = manager(5);
        assert_eq!(m.send("hi"), Err(SendError::NotConnected));

        m.connect();
        m.on_open();
        assert_eq!(m.send("hi"), Err(SendError::NoIdentity));

        m.on_message(INIT);
        assert!(m.is_ready());
        let Ok(Effect::Transmit { payload }) = m.send("  hi  ") else {
            panic!("expected transmit");
        };
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value, serde_json::json!({"type": "message", "text": "hi"}));
    }

    #[test]
    fn send_rejects_blank_and_oversized_text() {
        let mut m = manager(5);
        open_with_identity(&mut m);
        assert_eq!(m.send("   "), Err(SendError::Empty));
        let long = "x".repeat(1001);
        assert_eq!(
            m.send(&long),
            Err(SendError::TooLong {
                len: 1001,
                max: 1000
            })
        );
    }

    #[test]
    fn close_invalidates_server_identity() {
        let mut m = manager(5);
        open_with_identity(&mut m);
        assert_eq!(m.connection_id(), Some("abc"));
        m.on_close(None, "drop");
        assert_eq!(m.connection_id(), None);
        assert!(!m.is_ready());
    }

    #[test]
    fn send_failure_keeps_connection_open() {
        let mut m = manager(5);
        open_with_identity(&mut m);
        let err = m.on_send_failed("broken pipe");
        assert_eq!(err, SendError::Transport("broken pipe".into()));
        m.on_transport_error("socket hiccup");
        assert_eq!(m.state(), ConnectionState::Open);
    }

    #[test]
    fn bad_frames_are_dropped() {
        let mut m = manager(5);
        open_with_identity(&mut m);
        assert!(m.on_message("{not json").is_none());
        assert!(m.on_message(r#"{"type":"presence","who":"x"}"#).is_none());
        assert!(m.on_message(r#"{"type":"message","text":"no number"}"#).is_none());
        assert_eq!(m.state(), ConnectionState::Open);
    }

    proptest! {
        #[test]
        fn exactly_budget_attempts_with_linear_delays(budget in 0u32..12, base_ms in 1u64..5000) {
            let mut m = ConnectionManager::new(
                Url::parse("wss://chat.example.com/ws").unwrap(),
                ReconnectConfig { max_attempts: budget, base_delay: Duration::from_millis(base_ms) },
                1000,
            );
            m.connect();
            let mut attempts = 0u32;
            while let Some((delay, token)) = scheduled(&m.on_close(None, "drop")) {
                attempts += 1;
                prop_assert_eq!(delay, Duration::from_millis(base_ms) * attempts);
                m.on_reconnect_timer(token);
            }
            prop_assert_eq!(attempts, budget);
            prop_assert_eq!(m.state(), ConnectionState::Failed);
            prop_assert!(m.retry_count() <= budget);
        }
    }
}
