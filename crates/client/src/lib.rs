//! wschat client
//!
//! A WebSocket chat client: connection lifecycle with bounded reconnect,
//! reconciliation of history and live messages, and optional local
//! persistence. Runs natively on tokio or in the browser.

pub mod config;
pub mod events;
pub mod logging;
pub mod render;
pub mod session;
pub mod storage;
pub mod stores;
pub mod ws;

pub use config::{ClientConfig, ConfigError};
pub use events::{ChatEvent, Effect, MessageView};
pub use session::ChatClient;
pub use storage::{KeyValueStore, MemoryStore, PersistedSession, SessionPersistence};
pub use stores::{MessageStore, Notice, NoticeBoard, Snapshot, StoreChange};
pub use ws::{ConnectionManager, ConnectionState, ReconnectConfig};
