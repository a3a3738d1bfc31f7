//! Per-user sliding-window admission control.

use std::{collections::VecDeque, time::Duration};

use {
    dashmap::{DashMap, mapref::entry::Entry},
    relaydesk_common::UserId,
};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied { retry_after: Duration },
}

/// Sliding-window limiter keyed by user.
///
/// Each check prunes timestamps older than the window and admits iff fewer
/// than `max_messages` remain. The window slides continuously, so a burst
/// never locks a user out past the age of their oldest admitted message.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<UserId, VecDeque<u64>>,
    max_messages: usize,
    window_ms: u64,
}

impl RateLimiter {
    pub fn new(max_messages: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_messages,
            window_ms: window.as_millis() as u64,
        }
    }

    /// Admit one message from `user` at `now` (ms). Denials do not mutate state.
    pub fn admit(&self, user: UserId, now: u64) -> bool {
        self.check(user, now) == Admission::Admitted
    }

    /// Like [`admit`](Self::admit) but reports how long a denied user must wait.
    pub fn check(&self, user: UserId, now: u64) -> Admission {
        let cutoff = now.saturating_sub(self.window_ms);
        match self.windows.entry(user) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                while window.front().is_some_and(|&ts| ts < cutoff) {
                    window.pop_front();
                }
                if window.len() >= self.max_messages {
                    Admission::Denied {
                        retry_after: self.wait_for(window, now),
                    }
                } else {
                    window.push_back(now);
                    Admission::Admitted
                }
            },
            Entry::Vacant(vacant) => {
                if self.max_messages == 0 {
                    return Admission::Denied {
                        retry_after: Duration::from_millis(self.window_ms),
                    };
                }
                vacant.insert(VecDeque::from([now]));
                Admission::Admitted
            },
        }
    }

    /// Time until `user` would next be admitted, or `None` if they would be now.
    pub fn retry_after(&self, user: UserId, now: u64) -> Option<Duration> {
        let cutoff = now.saturating_sub(self.window_ms);
        let live: VecDeque<u64> = self
            .windows
            .get(&user)?
            .iter()
            .copied()
            .filter(|&ts| ts >= cutoff)
            .collect();
        (live.len() >= self.max_messages).then(|| self.wait_for(&live, now))
    }

    /// Drop windows with no timestamps left inside the window.
    /// Returns the number of users forgotten.
    pub fn prune(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_ms);
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            while window.front().is_some_and(|&ts| ts < cutoff) {
                window.pop_front();
            }
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of users with a tracked window.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    fn wait_for(&self, window: &VecDeque<u64>, now: u64) -> Duration {
        // The window is full, so the entry that must age out is the one that
        // leaves exactly `max_messages - 1` behind it.
        let blocking = window.len().saturating_sub(self.max_messages);
        let oldest = window.get(blocking).copied().unwrap_or(now);
        Duration::from_millis((oldest + self.window_ms + 1).saturating_sub(now))
    }
}
