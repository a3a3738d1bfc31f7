//! Shared identities, message content, and error plumbing used by every
//! relaydesk crate.

pub mod error;
pub mod text;
pub mod time;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{Content, MessageKind, MessageRef, OperatorId, PeerId, UserId, UserProfile},
};
