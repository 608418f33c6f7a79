//! The chat client: connection, message log, notices and persistence wired
//! together behind one explicitly owned value.
//!
//! Drivers call the `handle_*` methods as transport, timer and user events
//! arrive, then execute the returned [`Effect`]s in order.

use chrono::{DateTime, Utc};
use wschat_shared::{SendError, ServerEvent, SessionIdentity, WireMessage};

use crate::config::{ClientConfig, ConfigError};
use crate::events::{ChatEvent, Effect, MessageView};
use crate::storage::SessionPersistence;
use crate::stores::{MessageStore, NoticeBoard, Snapshot, StoreChange};
use crate::ws::{ConnectionManager, ConnectionState};

#[derive(Debug)]
pub struct ChatClient {
    connection: ConnectionManager,
    store: MessageStore,
    notices: NoticeBoard,
    persistence: Option<SessionPersistence>,
}

impl ChatClient {
    /// Build a client, restoring the saved session when `persistence` has one.
    pub fn new(
        config: &ClientConfig,
        persistence: Option<SessionPersistence>,
    ) -> Result<Self, ConfigError> {
        let endpoint = config.endpoint()?;
        let connection =
            ConnectionManager::new(endpoint, config.reconnect.clone(), config.max_message_len);

        let mut persistence = persistence;
        let saved = persistence.as_mut().and_then(|p| p.load());
        let (local, restored) = match saved {
            Some(saved) => {
                crate::log_info!(
                    "Restored session {} with {} messages",
                    saved.current_session_id,
                    saved.messages.len()
                );
                (SessionIdentity::local(saved.current_session_id), saved.messages)
            }
            None => (SessionIdentity::generate_local(), Vec::new()),
        };

        let mut store = MessageStore::new(Some(local), config.optimistic_echo);
        if !restored.is_empty() {
            store.restore(restored);
        }

        let mut client = Self {
            connection,
            store,
            notices: NoticeBoard::new(config.notice_ttl),
            persistence,
        };
        client.persist();
        Ok(client)
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        self.store.snapshot()
    }

    /// Begin connecting. Restored messages are announced first.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.store.is_empty() {
            let change = StoreChange::Reset {
                len: self.store.len(),
            };
            effects.push(self.messages_event(change));
        }
        effects.extend(self.connection.connect());
        effects
    }

    pub fn handle_open(&mut self) -> Vec<Effect> {
        self.connection.on_open()
    }

    pub fn handle_message(&mut self, raw: &str) -> Vec<Effect> {
        self.handle_message_at(raw, Utc::now())
    }

    /// Like [`Self::handle_message`], with an explicit receive time for
    /// messages that carry no `created_at`.
    pub fn handle_message_at(&mut self, raw: &str, received_at: DateTime<Utc>) -> Vec<Effect> {
        match self.connection.on_message(raw) {
            Some(event) => self.dispatch(event, received_at),
            None => Vec::new(),
        }
    }

    fn dispatch(&mut self, event: ServerEvent, received_at: DateTime<Utc>) -> Vec<Effect> {
        let convert = |batch: Vec<WireMessage>| -> Vec<_> {
            batch
                .into_iter()
                .map(|w| w.into_message(received_at))
                .collect()
        };

        match event {
            ServerEvent::Init {
                connection_id,
                history,
            } => {
                let change = self.store.apply_init(
                    SessionIdentity::server(connection_id.clone()),
                    history.map(convert),
                );
                let mut effects = vec![Effect::Emit(ChatEvent::IdentityAssigned(connection_id))];
                effects.extend(self.log_changed(change));
                effects
            }
            ServerEvent::Message(wire) => {
                let change = self.store.apply_live(wire.into_message(received_at));
                self.log_changed(change)
            }
            ServerEvent::History { messages } => {
                let change = self.store.apply_history(convert(messages));
                self.log_changed(change)
            }
            ServerEvent::Error { message } => self.notices.push(format!("Server error: {message}")),
        }
    }

    fn log_changed(&mut self, change: StoreChange) -> Vec<Effect> {
        if !change.is_change() {
            return Vec::new();
        }
        self.persist();
        vec![self.messages_event(change)]
    }

    fn messages_event(&self, change: StoreChange) -> Effect {
        let log = self.view();
        Effect::Emit(ChatEvent::Messages { change, log })
    }

    /// The log with ownership evaluated against the current identity.
    pub fn view(&self) -> Vec<MessageView> {
        self.store
            .snapshot()
            .iter()
            .map(|m| MessageView {
                message: m.clone(),
                own: self.store.ownership_of(m),
            })
            .collect()
    }

    pub fn handle_close(&mut self, code: Option<u16>, reason: &str) -> Vec<Effect> {
        self.store.invalidate_identity();
        self.connection.on_close(code, reason)
    }

    pub fn handle_transport_error(&mut self, detail: &str) -> Vec<Effect> {
        self.connection.on_transport_error(detail);
        Vec::new()
    }

    pub fn handle_reconnect_timer(&mut self, token: u64) -> Vec<Effect> {
        self.connection.on_reconnect_timer(token)
    }

    pub fn handle_notice_expired(&mut self, id: u64) -> Vec<Effect> {
        self.notices.expire(id)
    }

    pub fn reconnect_now(&mut self) -> Vec<Effect> {
        self.connection.reconnect_now()
    }

    /// Send user input. Refusals become a notice rather than an error.
    pub fn submit(&mut self, text: &str) -> Vec<Effect> {
        match self.connection.send(text) {
            Ok(transmit) => {
                let mut effects = vec![transmit];
                let change = self.store.push_provisional(text.trim(), Utc::now());
                effects.extend(self.log_changed(change));
                effects
            }
            Err(e) => self.notices.push(describe_send_error(&e)),
        }
    }

    /// The driver could not transmit a frame.
    pub fn handle_send_failed(&mut self, detail: &str) -> Vec<Effect> {
        let err = self.connection.on_send_failed(detail);
        self.notices.push(describe_send_error(&err))
    }

    fn persist(&mut self) {
        let Some(persistence) = self.persistence.as_mut() else {
            return;
        };
        let Some(local) = self.store.local_identity() else {
            return;
        };
        persistence.save(&local.id, self.store.snapshot().as_slice());
    }
}

fn describe_send_error(err: &SendError) -> String {
    match err {
        SendError::Empty => "Type a message first".to_string(),
        SendError::NotConnected => "Not connected to the server".to_string(),
        SendError::NoIdentity => "Still joining the chat, try again in a moment".to_string(),
        SendError::Transport(_) | SendError::Encode(_) => format!("Could not send message: {err}"),
        SendError::TooLong { .. } => err.to_string(),
    }
}
