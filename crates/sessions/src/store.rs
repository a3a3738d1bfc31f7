//! Authoritative live session map.
//!
//! Every single-key operation goes through the `DashMap` entry API so it is
//! an atomic read-modify-write on that user's shard. Sweeps use `retain`.

use std::{sync::Arc, time::Duration};

use {
    dashmap::DashMap,
    relaydesk_common::{MessageKind, MessageRef, UserId, UserProfile},
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use relaydesk_metrics::{counter, gauge, state as state_metrics};

use crate::{
    error::Result,
    history::{HistorySink, bounded},
    memory::InMemoryHistory,
    session::{MessageSnapshot, UserSession},
};

pub struct SessionStore {
    sessions: DashMap<UserId, UserSession>,
    history: Arc<dyn HistorySink>,
    storage_timeout: Duration,
}

impl SessionStore {
    pub fn new(history: Arc<dyn HistorySink>, storage_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            history,
            storage_timeout,
        }
    }

    /// Store backed by [`InMemoryHistory`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryHistory::new()), Duration::from_secs(5))
    }

    pub fn history(&self) -> &Arc<dyn HistorySink> {
        &self.history
    }

    /// Return the session for `user`, creating it if unseen.
    ///
    /// An existing session has `last_activity` refreshed and any newly known
    /// profile fields filled in; `active_since` never changes.
    pub fn get_or_create(&self, user: UserId, profile: &UserProfile, now: u64) -> UserSession {
        let entry = self
            .sessions
            .entry(user)
            .and_modify(|s| {
                s.touch(now);
                if profile.display_name.is_some() {
                    s.profile.display_name.clone_from(&profile.display_name);
                }
                if profile.handle.is_some() {
                    s.profile.handle.clone_from(&profile.handle);
                }
            })
            .or_insert_with(|| {
                debug!(user_id = %user, "session created");
                UserSession::new(user, profile.clone(), now)
            });
        let session = entry.value().clone();
        drop(entry);
        self.report_active();
        session
    }

    /// Replace the last-message snapshot. Returns the updated session.
    pub fn update_snapshot(&self, user: UserId, snapshot: &MessageSnapshot) -> Option<UserSession> {
        self.sessions.get_mut(&user).map(|mut s| {
            s.record_snapshot(snapshot);
            s.clone()
        })
    }

    /// Write the durable copy of `session`.
    pub async fn persist(&self, session: &UserSession) -> Result<()> {
        bounded(
            "upsert_session",
            self.storage_timeout,
            self.history.upsert_session(session),
        )
        .await
    }

    /// Remember an outbound message sent on behalf of `user`.
    ///
    /// The in-memory list is only updated while the session is live; the
    /// durable history always receives the row.
    pub async fn record_outbound(
        &self,
        user: UserId,
        message: MessageRef,
        kind: MessageKind,
        now: u64,
    ) -> Result<()> {
        if let Some(mut session) = self.sessions.get_mut(&user) {
            session.push_outbound(message);
        }
        bounded(
            "append_message",
            self.storage_timeout,
            self.history.append_message(user, &message, kind, now),
        )
        .await
    }

    /// Every known outbound message for `user`: durable rows first, then any
    /// in-memory refs not yet persisted.
    ///
    /// The error, if any, is from the durable read; the in-memory refs are
    /// still returned alongside it.
    pub async fn sent_messages(&self, user: UserId) -> (Vec<MessageRef>, Option<crate::Error>) {
        let live: Vec<MessageRef> = self
            .sessions
            .get(&user)
            .map(|s| s.sent_messages.clone())
            .unwrap_or_default();

        let durable = bounded(
            "messages_for",
            self.storage_timeout,
            self.history.messages_for(user),
        )
        .await;

        match durable {
            Ok(mut all) => {
                for message in live {
                    if !all.contains(&message) {
                        all.push(message);
                    }
                }
                (all, None)
            },
            Err(e) => (live, Some(e)),
        }
    }

    /// Drop the durable session and message rows for `user`.
    pub async fn purge_history(&self, user: UserId) -> Result<u64> {
        bounded(
            "delete_all",
            self.storage_timeout,
            self.history.delete_all(user),
        )
        .await
    }

    pub fn get(&self, user: UserId) -> Option<UserSession> {
        self.sessions.get(&user).map(|s| s.clone())
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    /// Live sessions, most recently active first.
    pub fn list(&self) -> Vec<UserSession> {
        let mut sessions: Vec<UserSession> = self.sessions.iter().map(|s| s.clone()).collect();
        sessions.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then(a.user_id.cmp(&b.user_id))
        });
        sessions
    }

    pub fn active_user_ids(&self) -> Vec<UserId> {
        self.sessions.iter().map(|s| *s.key()).collect()
    }

    pub fn count_active(&self) -> usize {
        self.sessions.len()
    }

    /// Evict sessions idle for longer than `inactivity`. Returns the count removed.
    pub fn sweep(&self, inactivity: Duration, now: u64) -> usize {
        let threshold = inactivity.as_millis() as u64;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.idle_for(now) <= threshold);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, "evicted inactive sessions");
            #[cfg(feature = "metrics")]
            counter!(state_metrics::SESSIONS_EVICTED_TOTAL).increment(evicted as u64);
        }
        self.report_active();
        evicted
    }

    /// Remove a live session. Idempotent.
    pub fn remove(&self, user: UserId) -> Option<UserSession> {
        let removed = self.sessions.remove(&user).map(|(_, s)| s);
        self.report_active();
        removed
    }

    fn report_active(&self) {
        #[cfg(feature = "metrics")]
        gauge!(state_metrics::ACTIVE_SESSIONS).set(self.sessions.len() as f64);
    }
}
