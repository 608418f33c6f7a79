//! WebSocket connection to the chat server.
//!
//! This module provides:
//! - The connection state machine with bounded linear reconnect
//! - A native driver (tokio-tungstenite) and a web driver (`web_sys::WebSocket`)
//!
//! # Architecture
//!
//! ```text
//!   transport / timers / user input
//!                 │
//!                 ▼
//!   ┌──────────────────────────────┐
//!   │          ChatClient          │
//!   │  ConnectionManager ──parsed──┼──▶ MessageStore
//!   │                              │    NoticeBoard
//!   └──────────────────────────────┘
//!                 │ Vec<Effect>
//!                 ▼
//!        driver (native / wasm)
//!        connect · transmit · timers · emit ChatEvent ──▶ renderer
//! ```

mod connection;

pub use connection::{ConnectionManager, ConnectionState, ReconnectConfig};

#[cfg(not(target_arch = "wasm32"))]
pub use connection::{run_chat, spawn_chat, ChatHandle, UserCommand};

#[cfg(target_arch = "wasm32")]
pub use connection::WebChat;
