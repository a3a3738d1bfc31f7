//! Metric name and label definitions.

/// Relay engine metrics
pub mod relay {
    /// Inbound user messages accepted by the admission check
    pub const USER_MESSAGES_TOTAL: &str = "relaydesk_user_messages_total";
    /// Inbound user messages rejected by the rate limiter
    pub const THROTTLED_TOTAL: &str = "relaydesk_throttled_total";
    /// Operator replies relayed to a user
    pub const REPLIES_TOTAL: &str = "relaydesk_replies_total";
    /// Outbound deliveries that failed (labelled by `op`: notify, reply, ack, broadcast, delete)
    pub const DELIVERY_FAILURES_TOTAL: &str = "relaydesk_delivery_failures_total";
    /// Operator actions rejected by the authorization gate
    pub const UNAUTHORIZED_TOTAL: &str = "relaydesk_unauthorized_total";
    /// Time spent handling one inbound event in seconds
    pub const EVENT_DURATION_SECONDS: &str = "relaydesk_event_duration_seconds";
}

/// Session and route state metrics
pub mod state {
    /// Sessions currently held in memory
    pub const ACTIVE_SESSIONS: &str = "relaydesk_active_sessions";
    /// Operators currently bound to a user
    pub const ACTIVE_ROUTES: &str = "relaydesk_active_routes";
    /// Sessions evicted by the inactivity sweep
    pub const SESSIONS_EVICTED_TOTAL: &str = "relaydesk_sessions_evicted_total";
    /// Routes expired by the timeout sweep
    pub const ROUTES_EXPIRED_TOTAL: &str = "relaydesk_routes_expired_total";
}

/// Telegram transport metrics
pub mod telegram {
    /// Updates received from Telegram
    pub const UPDATES_RECEIVED_TOTAL: &str = "relaydesk_telegram_updates_received_total";
    /// Requests retried after a `RetryAfter` response
    pub const RETRIES_TOTAL: &str = "relaydesk_telegram_retries_total";
    /// `getUpdates` failures
    pub const POLLING_ERRORS_TOTAL: &str = "relaydesk_telegram_polling_errors_total";
}
