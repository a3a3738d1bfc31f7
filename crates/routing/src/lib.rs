//! Operator reply routing: which user an operator's next message goes to.

pub mod router;

pub use router::{ReplyRoute, ReplyRouter, RouteState};
