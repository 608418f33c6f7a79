//! Shared types for the wschat client: wire protocol, domain models and errors.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
