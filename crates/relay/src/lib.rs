//! Session-routing core of the support relay.
//!
//! Many anonymous users talk 1:1 with "support"; a small pool of operators
//! sees every inbound message in one shared channel and claims users to
//! reply to them. This crate owns the shared state that makes that work:
//!
//! - [`RateLimiter`]: per-user sliding-window admission
//! - [`relaydesk_sessions::SessionStore`]: live user sessions
//! - [`relaydesk_routing::ReplyRouter`]: operator → user bindings
//! - [`AuditLog`]: operator action trail
//! - [`RelayEngine`]: consumes inbound events and drives the flows
//! - [`CleanupScheduler`]: periodic sweeps

pub mod audit;
pub mod cleanup;
mod commands;
pub mod engine;
pub mod error;
mod notify;
pub mod rate_limit;

pub use {
    audit::AuditLog,
    cleanup::CleanupScheduler,
    engine::{
        BroadcastReport, Clock, DeleteReport, RelayEngine, RelaySettings, ReplyOutcome, Stats,
        SweepReport, UserMessageOutcome,
    },
    error::{RelayError, Result},
    rate_limit::{Admission, RateLimiter},
};
