//! Best-effort operator audit trail.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    relaydesk_common::{OperatorId, UserId, time::now_ms},
    relaydesk_sessions::{AuditAction, AuditEntry, HistorySink, bounded},
    tracing::{debug, warn},
};

use crate::engine::Clock;

const RECENT_CAPACITY: usize = 256;

/// Append-only audit log.
///
/// Entries are stamped on append and never go back in time. Every entry
/// lands in a bounded in-memory ring and is then written to the durable sink
/// in the same order. A failed durable write is logged and never surfaces to
/// the caller.
pub struct AuditLog {
    sink: Arc<dyn HistorySink>,
    recent: Mutex<VecDeque<AuditEntry>>,
    /// Held across the durable write so the sink sees ring order.
    write_order: tokio::sync::Mutex<()>,
    last_at: Mutex<u64>,
    clock: Clock,
    timeout: Duration,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn HistorySink>, timeout: Duration) -> Self {
        Self {
            sink,
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            write_order: tokio::sync::Mutex::new(()),
            last_at: Mutex::new(0),
            clock: Arc::new(now_ms),
            timeout,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Record `action` at the current time and return the stored entry.
    pub async fn append(
        &self,
        operator: OperatorId,
        action: AuditAction,
        target: Option<UserId>,
    ) -> AuditEntry {
        let _order = self.write_order.lock().await;
        let entry = AuditEntry {
            operator_id: operator,
            action,
            target,
            at: self.stamp(),
        };
        {
            let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(entry.clone());
        }
        debug!(operator_id = %operator, %action, user_id = ?target, at = entry.at, "audit");

        if let Err(e) = bounded("append_audit", self.timeout, self.sink.append_audit(&entry)).await
        {
            warn!(operator_id = %operator, %action, error = %e, "failed to persist audit entry");
        }
        entry
    }

    fn stamp(&self) -> u64 {
        let mut last = self.last_at.lock().unwrap_or_else(|e| e.into_inner());
        *last = (self.clock)().max(*last);
        *last
    }

    /// Entries appended by this process, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        relaydesk_sessions::InMemoryHistory,
        std::sync::atomic::{AtomicU64, Ordering},
    };

    fn manual_clock(start: u64) -> (Arc<AtomicU64>, Clock) {
        let ticks = Arc::new(AtomicU64::new(start));
        let read = Arc::clone(&ticks);
        (ticks, Arc::new(move || read.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn appends_to_ring_and_sink() {
        let sink = Arc::new(InMemoryHistory::new());
        let log = AuditLog::new(sink.clone(), Duration::from_secs(1));
        log.append(OperatorId(1), AuditAction::Claimed, Some(UserId(5)))
            .await;
        log.append(OperatorId(1), AuditAction::Replied, Some(UserId(5)))
            .await;

        let recent: Vec<AuditAction> = log.recent(10).into_iter().map(|e| e.action).collect();
        assert_eq!(recent, vec![AuditAction::Replied, AuditAction::Claimed]);
        assert_eq!(sink.audit_entries().len(), 2);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let sink = Arc::new(InMemoryHistory::new());
        sink.set_failing(true);
        let log = AuditLog::new(sink.clone(), Duration::from_secs(1));
        log.append(OperatorId(1), AuditAction::Broadcast, None).await;

        assert_eq!(log.len(), 1);
        sink.set_failing(false);
        assert!(sink.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn ring_is_bounded() {
        let (ticks, clock) = manual_clock(0);
        let log = AuditLog::new(Arc::new(InMemoryHistory::new()), Duration::from_secs(1))
            .with_clock(clock);
        for _ in 0..(RECENT_CAPACITY + 10) {
            log.append(OperatorId(1), AuditAction::InfoViewed, None).await;
            ticks.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(log.len(), RECENT_CAPACITY);
        assert_eq!(log.recent(1)[0].at, RECENT_CAPACITY as u64 + 9);
    }

    #[tokio::test]
    async fn timestamps_follow_insertion_order() {
        let sink = Arc::new(InMemoryHistory::new());
        let (ticks, clock) = manual_clock(200);
        let log = AuditLog::new(sink.clone(), Duration::from_secs(1)).with_clock(clock);

        let first = log.append(OperatorId(1), AuditAction::Claimed, None).await;
        // A clock that steps backwards must not reorder the log.
        ticks.store(100, Ordering::SeqCst);
        let second = log.append(OperatorId(2), AuditAction::Replied, None).await;
        ticks.store(300, Ordering::SeqCst);
        let third = log.append(OperatorId(3), AuditAction::Broadcast, None).await;

        assert_eq!((first.at, second.at, third.at), (200, 200, 300));
        let durable: Vec<u64> = sink.audit_entries().iter().map(|e| e.at).collect();
        assert_eq!(durable, vec![200, 200, 300]);
    }

    #[tokio::test]
    async fn concurrent_appends_reach_the_sink_in_ring_order() {
        let sink = Arc::new(InMemoryHistory::new());
        let (ticks, clock) = manual_clock(0);
        let log = Arc::new(AuditLog::new(sink.clone(), Duration::from_secs(1)).with_clock(clock));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let log = Arc::clone(&log);
                let ticks = Arc::clone(&ticks);
                tokio::spawn(async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    log.append(OperatorId(i), AuditAction::InfoViewed, None)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let durable: Vec<(OperatorId, u64)> = sink
            .audit_entries()
            .iter()
            .map(|e| (e.operator_id, e.at))
            .collect();
        let mut ring: Vec<(OperatorId, u64)> = log
            .recent(64)
            .iter()
            .map(|e| (e.operator_id, e.at))
            .collect();
        ring.reverse();
        assert_eq!(durable, ring);
        assert!(durable.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
