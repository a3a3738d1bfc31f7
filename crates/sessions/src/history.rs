//! Durable history: the append/query boundary behind the live session map.

use std::{fmt, future::Future, str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    relaydesk_common::{MessageKind, MessageRef, OperatorId, UserId},
    serde::{Deserialize, Serialize},
};

use crate::{
    error::{Error, Result},
    session::UserSession,
};

/// Operator actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Claimed,
    Replied,
    DirectReply,
    RouteCancelled,
    DeletedHistory,
    InfoViewed,
    BlockRequested,
    Broadcast,
    ManualCleanup,
}

impl AuditAction {
    pub const ALL: [Self; 9] = [
        Self::Claimed,
        Self::Replied,
        Self::DirectReply,
        Self::RouteCancelled,
        Self::DeletedHistory,
        Self::InfoViewed,
        Self::BlockRequested,
        Self::Broadcast,
        Self::ManualCleanup,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Replied => "replied",
            Self::DirectReply => "direct_reply",
            Self::RouteCancelled => "route_cancelled",
            Self::DeletedHistory => "deleted_history",
            Self::InfoViewed => "info_viewed",
            Self::BlockRequested => "block_requested",
            Self::Broadcast => "broadcast",
            Self::ManualCleanup => "manual_cleanup",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::message(format!("unknown audit action: {s}")))
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub operator_id: OperatorId,
    pub action: AuditAction,
    pub target: Option<UserId>,
    /// Milliseconds since epoch.
    pub at: u64,
}

/// An outbound message recorded for later bulk deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub user_id: UserId,
    pub message: MessageRef,
    pub kind: MessageKind,
    pub at: u64,
}

/// Row counts reported by `/stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryCounts {
    pub sessions: u64,
    pub messages: u64,
    pub audit: u64,
}

/// Append/query store for everything that outlives the in-memory session map.
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Insert or refresh the durable copy of a session.
    async fn upsert_session(&self, session: &UserSession) -> Result<()>;

    /// Record an outbound message. Recording the same message twice is a no-op.
    async fn append_message(
        &self,
        user: UserId,
        message: &MessageRef,
        kind: MessageKind,
        at: u64,
    ) -> Result<()>;

    /// Every recorded outbound message for `user`, oldest first.
    async fn messages_for(&self, user: UserId) -> Result<Vec<MessageRef>>;

    /// Drop the session row and all message rows for `user`.
    /// Returns the number of message rows removed.
    async fn delete_all(&self, user: UserId) -> Result<u64>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()>;

    /// Most recent audit entries, newest first.
    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>>;

    async fn count_sessions(&self) -> Result<u64>;
    async fn count_messages(&self) -> Result<u64>;
    async fn count_audit(&self) -> Result<u64>;

    async fn counts(&self) -> Result<HistoryCounts> {
        Ok(HistoryCounts {
            sessions: self.count_sessions().await?,
            messages: self.count_messages().await?,
            audit: self.count_audit().await?,
        })
    }
}

/// Run a history call with an upper time bound.
pub async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::timeout(operation, limit))?
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_action_names_roundtrip() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("reset".parse::<AuditAction>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_times_out_slow_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(1)
        };
        let err = bounded("count", Duration::from_secs(1), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "count", .. }));
    }

    #[tokio::test]
    async fn bounded_passes_results_through() {
        let value = bounded("count", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
