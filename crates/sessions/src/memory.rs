//! In-memory [`HistorySink`] for tests and database-less runs.

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    relaydesk_common::{MessageKind, MessageRef, UserId},
};

use crate::{
    error::{Error, Result},
    history::{AuditEntry, HistorySink, StoredMessage},
    session::UserSession,
};

#[derive(Default)]
struct Inner {
    sessions: HashMap<UserId, UserSession>,
    messages: Vec<StoredMessage>,
    audit: Vec<AuditEntry>,
}

/// Volatile history store. Can be switched into a failing mode to exercise
/// persistence-failure paths.
#[derive(Default)]
pub struct InMemoryHistory {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call returns [`Error::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All audit entries, oldest first.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.lock().audit.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Inner>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::unavailable("in-memory history is failing"));
        }
        Ok(self.lock())
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn upsert_session(&self, session: &UserSession) -> Result<()> {
        self.guard()?
            .sessions
            .insert(session.user_id, session.clone());
        Ok(())
    }

    async fn append_message(
        &self,
        user: UserId,
        message: &MessageRef,
        kind: MessageKind,
        at: u64,
    ) -> Result<()> {
        let mut inner = self.guard()?;
        if inner.messages.iter().any(|m| m.message == *message) {
            return Ok(());
        }
        inner.messages.push(StoredMessage {
            user_id: user,
            message: *message,
            kind,
            at,
        });
        Ok(())
    }

    async fn messages_for(&self, user: UserId) -> Result<Vec<MessageRef>> {
        Ok(self
            .guard()?
            .messages
            .iter()
            .filter(|m| m.user_id == user)
            .map(|m| m.message)
            .collect())
    }

    async fn delete_all(&self, user: UserId) -> Result<u64> {
        let mut inner = self.guard()?;
        inner.sessions.remove(&user);
        let before = inner.messages.len();
        inner.messages.retain(|m| m.user_id != user);
        Ok((before - inner.messages.len()) as u64)
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<()> {
        self.guard()?.audit.push(entry.clone());
        Ok(())
    }

    async fn recent_audit(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        Ok(self
            .guard()?
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_sessions(&self) -> Result<u64> {
        Ok(self.guard()?.sessions.len() as u64)
    }

    async fn count_messages(&self) -> Result<u64> {
        Ok(self.guard()?.messages.len() as u64)
    }

    async fn count_audit(&self) -> Result<u64> {
        Ok(self.guard()?.audit.len() as u64)
    }
}
