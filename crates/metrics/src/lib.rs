//! Metric definitions for relaydesk.
//!
//! Crates record through the `metrics` facade re-exported here; the values
//! are dropped unless the embedding process installs a recorder.
//!
//! ```rust,ignore
//! use relaydesk_metrics::{counter, relay};
//!
//! counter!(relay::USER_MESSAGES_TOTAL).increment(1);
//! ```

mod definitions;

pub use definitions::*;

pub use metrics::{counter, gauge, histogram};
