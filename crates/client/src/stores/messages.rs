//! Message log and reconciliation.
//!
//! History batches are merged in `created_at` order, live pushes are appended
//! in arrival order, and confirmed messages are deduplicated on
//! `(origin_id, sequence_number)`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use wschat_shared::{ChatMessage, SessionIdentity};

/// What a store operation did to the log, for the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// One message was added at `index`.
    Inserted { index: usize },
    /// The message at `index` was replaced by its confirmed version.
    Replaced { index: usize },
    /// A history batch added or confirmed `inserted` messages at various positions.
    Merged { inserted: usize },
    /// The whole log was replaced.
    Reset { len: usize },
    Unchanged,
}

impl StoreChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, StoreChange::Unchanged | StoreChange::Merged { inserted: 0 })
    }
}

/// Borrowed, ordered view of the log.
///
/// Iterating does not touch the store, and the same snapshot can be iterated
/// as many times as needed.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    messages: &'a [ChatMessage],
}

impl<'a> Snapshot<'a> {
    pub fn iter(&self) -> std::slice::Iter<'a, ChatMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a ChatMessage> {
        self.messages.get(index)
    }

    pub fn as_slice(&self) -> &'a [ChatMessage] {
        self.messages
    }
}

impl<'a> IntoIterator for Snapshot<'a> {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

impl<'a, 'b> IntoIterator for &'b Snapshot<'a> {
    type Item = &'a ChatMessage;
    type IntoIter = std::slice::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// The client's ordered message log plus the identity used to tell own
/// messages from everyone else's.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    keys: HashSet<(String, i64)>,
    identity: Option<SessionIdentity>,
    /// Client-generated fallback, kept when a server identity is dropped.
    local_identity: Option<SessionIdentity>,
    optimistic_echo: bool,
}

impl MessageStore {
    pub fn new(local_identity: Option<SessionIdentity>, optimistic_echo: bool) -> Self {
        Self {
            messages: Vec::new(),
            keys: HashSet::new(),
            identity: local_identity.clone(),
            local_identity,
            optimistic_echo,
        }
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn local_identity(&self) -> Option<&SessionIdentity> {
        self.local_identity.as_ref()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Accept the server identity and merge any history that came with it.
    pub fn apply_init(
        &mut self,
        identity: SessionIdentity,
        history: Option<Vec<ChatMessage>>,
    ) -> StoreChange {
        if identity.is_authoritative() {
            crate::log_debug!("Session identity is now {}", identity);
        } else {
            self.local_identity = Some(identity.clone());
        }
        self.identity = Some(identity);
        match history {
            Some(batch) => self.apply_history(batch),
            None => StoreChange::Unchanged,
        }
    }

    /// Merge a batch into the log. Applying the same batch again is a no-op.
    ///
    /// A confirmed copy of a provisional entry takes that entry's place in
    /// the log, moved to its own `created_at` position.
    pub fn apply_history(&mut self, mut batch: Vec<ChatMessage>) -> StoreChange {
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut inserted = 0;
        for mut msg in batch {
            let known = match msg.key() {
                Some(key) => self.contains_key(key.origin_id, key.sequence_number),
                None => self.messages.contains(&msg),
            };
            if known {
                continue;
            }

            match self.provisional_for(&msg) {
                Some(index) => {
                    self.messages.remove(index);
                    msg.is_local_origin = true;
                }
                None => {
                    let own = self.ownership_of(&msg);
                    msg.is_local_origin |= own;
                }
            }

            let pos = self
                .messages
                .iter()
                .position(|m| m.created_at > msg.created_at)
                .unwrap_or(self.messages.len());
            self.remember_key(&msg);
            self.messages.insert(pos, msg);
            inserted += 1;
        }

        if inserted > 0 {
            crate::log_debug!("Merged {} history messages", inserted);
        }
        StoreChange::Merged { inserted }
    }

    /// Add a pushed message, replacing an earlier copy of the same message.
    pub fn apply_live(&mut self, mut msg: ChatMessage) -> StoreChange {
        if let Some(key) = msg.key() {
            if let Some(index) = self
                .messages
                .iter()
                .position(|m| m.key() == Some(key))
            {
                msg.is_local_origin |= self.messages[index].is_local_origin;
                self.messages[index] = msg;
                return StoreChange::Replaced { index };
            }
        }

        if let Some(index) = self.provisional_for(&msg) {
            msg.is_local_origin = true;
            self.remember_key(&msg);
            self.messages[index] = msg;
            return StoreChange::Replaced { index };
        }

        let own = self.ownership_of(&msg);
        msg.is_local_origin |= own;
        self.remember_key(&msg);
        self.messages.push(msg);
        StoreChange::Inserted {
            index: self.messages.len() - 1,
        }
    }

    /// The oldest provisional entry that `confirmed` is the server's copy of.
    /// Matched on origin and text, whoever the current identity is.
    fn provisional_for(&self, confirmed: &ChatMessage) -> Option<usize> {
        if confirmed.is_provisional() {
            return None;
        }
        self.messages.iter().position(|m| {
            m.is_provisional() && m.origin_id == confirmed.origin_id && m.text == confirmed.text
        })
    }

    /// Show a just-sent message before the server confirms it. Does nothing
    /// unless optimistic echo is on and there is an identity to tag it with.
    pub fn push_provisional(&mut self, text: &str, created_at: DateTime<Utc>) -> StoreChange {
        if !self.optimistic_echo {
            return StoreChange::Unchanged;
        }
        let Some(identity) = self.identity.as_ref() else {
            return StoreChange::Unchanged;
        };
        let msg = ChatMessage::provisional(text, identity.id.clone(), created_at);
        self.messages.push(msg);
        StoreChange::Inserted {
            index: self.messages.len() - 1,
        }
    }

    /// Whether `msg` was authored by the current identity.
    pub fn ownership_of(&self, msg: &ChatMessage) -> bool {
        self.identity
            .as_ref()
            .is_some_and(|identity| identity.id == msg.origin_id)
    }

    /// Drop a server identity after a disconnect. A local identity stays.
    pub fn invalidate_identity(&mut self) {
        if self.identity.as_ref().is_some_and(|i| i.is_authoritative()) {
            self.identity = self.local_identity.clone();
        }
    }

    /// Replace the log with previously persisted messages.
    pub fn restore(&mut self, mut messages: Vec<ChatMessage>) -> StoreChange {
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.keys.clear();
        for msg in &messages {
            if let Some(key) = msg.key() {
                self.keys
                    .insert((key.origin_id.to_string(), key.sequence_number));
            }
        }
        self.messages = messages;
        StoreChange::Reset {
            len: self.messages.len(),
        }
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            messages: &self.messages,
        }
    }

    fn contains_key(&self, origin_id: &str, sequence_number: i64) -> bool {
        self.keys
            .contains(&(origin_id.to_string(), sequence_number))
    }

    fn remember_key(&mut self, msg: &ChatMessage) {
        if let Some(key) = msg.key() {
            self.keys
                .insert((key.origin_id.to_string(), key.sequence_number));
        }
    }
}
