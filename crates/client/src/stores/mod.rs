//! Client-side state: the message log and transient notices.

pub mod messages;
pub mod notices;

pub use messages::{MessageStore, Snapshot, StoreChange};
pub use notices::{Notice, NoticeBoard};
