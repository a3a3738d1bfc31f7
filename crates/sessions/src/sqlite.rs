//! SQLite-backed history using sqlx.

use {
    async_trait::async_trait,
    relaydesk_common::{MessageKind, MessageRef, OperatorId, PeerId, UserId, UserProfile},
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    history::{AuditAction, AuditEntry, HistorySink},
    session::UserSession,
};

/// SQLite persistence for sessions, outbound message refs and the audit log.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open a pool for `database_url` and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        debug!(database_url, "history database ready");
        Ok(Self { pool })
    }

    /// Use an existing pool. Migrations must already be run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the durable copy of one session. Outbound refs are not included.
    pub async fn load_session(&self, user: UserId) -> Result<Option<UserSession>> {
        let row = sqlx::query(
            "SELECT user_id, display_name, handle, active_since, last_activity, conversation
             FROM sessions WHERE user_id = ?",
        )
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let conversation: String = row.get("conversation");
        Ok(Some(UserSession {
            user_id: UserId(row.get("user_id")),
            profile: UserProfile::new(row.get("display_name"), row.get("handle")),
            active_since: row.get::<i64, _>("active_since") as u64,
            last_activity: row.get::<i64, _>("last_activity") as u64,
            sent_messages: Vec::new(),
            sent_total: 0,
            conversation: serde_json::from_str(&conversation)?,
        }))
    }
}

#[async_trait]
impl HistorySink for SqliteHistory {
    async fn upsert_session(&self, session: &UserSession) -> Result<()> {
        let conversation = serde_json::to_string(&session.conversation)?;
        sqlx::query(
            "INSERT INTO sessions (user_id, display_name, handle, active_since, last_activity, conversation)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                handle = excluded.handle,
                last_activity = excluded.last_activity,
                conversation = excluded.conversation",
        )
        .bind(session.user_id.0)
        .bind(&session.profile.display_name)
        .bind(&session.profile.handle)
        .bind(session.active_since as i64)
        .bind(session.last_activity as i64)
        .bind(&conversation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_message(
        &self,
        user: UserId,
        message: &MessageRef,
        kind: MessageKind,
        at: u64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO message_history (user_id, chat_id, message_id, kind, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.0)
        .bind(message.chat.0)
        .bind(message.message_id)
        .bind(kind.as_str())
        .bind(at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages_for(&self, user: UserId) -> Result<Vec<MessageRef>> {
        let rows = sqlx::query(
            "SELECT chat_id, message_id FROM message_history WHERE user_id = ? ORDER BY id",
        )
        .bind(user.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MessageRef::new(PeerId(row.get("chat_id")), row.get("message_id")))
            .collect())
    }

    async fn delete_all(&self, user: UserId) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM message_history WHERE user_id = ?")
            .bind(user.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_log (operator_id, action, target_user_id, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.operator_id.0)
        .bind(entry.action.as_str())
        .bind(entry.target.map(|u| u.0))
        .bind(entry.at as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT operator_id, action, target_user_id, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let action: String = row.get("action");
            entries.push(AuditEntry {
                operator_id: OperatorId(row.get("operator_id")),
                action: action.parse::<AuditAction>()?,
                target: row.get::<Option<i64>, _>("target_user_id").map(UserId),
                at: row.get::<i64, _>("created_at") as u64,
            });
        }
        Ok(entries)
    }

    async fn count_sessions(&self) -> Result<u64> {
        count(&self.pool, "SELECT COUNT(*) FROM sessions").await
    }

    async fn count_messages(&self) -> Result<u64> {
        count(&self.pool, "SELECT COUNT(*) FROM message_history").await
    }

    async fn count_audit(&self) -> Result<u64> {
        count(&self.pool, "SELECT COUNT(*) FROM audit_log").await
    }
}

async fn count(pool: &SqlitePool, sql: &'static str) -> Result<u64> {
    let n: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
    u64::try_from(n).map_err(|_| Error::message(format!("negative row count from: {sql}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::history::HistoryCounts};

    async fn history() -> SqliteHistory {
        // One connection: every connection to `sqlite::memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteHistory::with_pool(pool)
    }

    fn session(user: i64, now: u64) -> UserSession {
        let mut s = UserSession::new(
            UserId(user),
            UserProfile::new(Some("Ada".into()), Some("ada".into())),
            now,
        );
        s.conversation.insert("last_message".into(), "hi".into());
        s
    }

    #[tokio::test]
    async fn upsert_keeps_active_since_and_refreshes_activity() {
        let store = history().await;
        store.upsert_session(&session(1, 100)).await.unwrap();

        let mut later = session(1, 500);
        later.active_since = 500;
        store.upsert_session(&later).await.unwrap();

        let loaded = store.load_session(UserId(1)).await.unwrap().unwrap();
        assert_eq!(loaded.active_since, 100);
        assert_eq!(loaded.last_activity, 500);
        assert_eq!(loaded.profile.handle.as_deref(), Some("ada"));
        assert_eq!(loaded.conversation["last_message"], "hi");
        assert_eq!(store.count_sessions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn messages_are_ordered_and_deduplicated() {
        let store = history().await;
        let refs = [
            MessageRef::new(UserId(1), 3),
            MessageRef::new(UserId(1), 1),
            MessageRef::new(UserId(1), 3),
        ];
        for r in &refs {
            store
                .append_message(UserId(1), r, MessageKind::Text, 10)
                .await
                .unwrap();
        }
        assert_eq!(
            store.messages_for(UserId(1)).await.unwrap(),
            vec![refs[0], refs[1]]
        );
    }

    #[tokio::test]
    async fn delete_all_purges_session_and_messages() {
        let store = history().await;
        store.upsert_session(&session(1, 0)).await.unwrap();
        store.upsert_session(&session(2, 0)).await.unwrap();
        for id in 1..=3 {
            store
                .append_message(UserId(1), &MessageRef::new(UserId(1), id), MessageKind::Photo, 0)
                .await
                .unwrap();
        }
        store
            .append_message(UserId(2), &MessageRef::new(UserId(2), 9), MessageKind::Text, 0)
            .await
            .unwrap();

        assert_eq!(store.delete_all(UserId(1)).await.unwrap(), 3);
        assert!(store.load_session(UserId(1)).await.unwrap().is_none());
        assert_eq!(
            store.counts().await.unwrap(),
            HistoryCounts {
                sessions: 1,
                messages: 1,
                audit: 0,
            }
        );
    }

    #[tokio::test]
    async fn audit_roundtrip_newest_first() {
        let store = history().await;
        let entries = [
            AuditEntry {
                operator_id: OperatorId(7),
                action: AuditAction::Claimed,
                target: Some(UserId(1)),
                at: 1,
            },
            AuditEntry {
                operator_id: OperatorId(7),
                action: AuditAction::Broadcast,
                target: None,
                at: 2,
            },
        ];
        for e in &entries {
            store.append_audit(e).await.unwrap();
        }
        let recent = store.recent_audit(10).await.unwrap();
        assert_eq!(recent, vec![entries[1].clone(), entries[0].clone()]);
        assert_eq!(store.count_audit().await.unwrap(), 2);
    }
}
