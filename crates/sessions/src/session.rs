use std::collections::BTreeMap;

use relaydesk_common::{Content, MessageKind, MessageRef, UserId, UserProfile};

const KEY_LAST_MESSAGE: &str = "last_message";
const KEY_LAST_KIND: &str = "last_message_kind";
const KEY_LAST_AT: &str = "last_message_at";

/// Outbound refs kept in memory per session. Older refs are only in the
/// durable history.
pub const LIVE_OUTBOUND_CAPACITY: usize = 256;

/// Live state for one end user who has written to support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: UserId,
    pub profile: UserProfile,
    /// Milliseconds since epoch.
    pub active_since: u64,
    /// Milliseconds since epoch; never earlier than `active_since`.
    pub last_activity: u64,
    /// Most recent outbound messages sent on this user's behalf, oldest
    /// first, at most [`LIVE_OUTBOUND_CAPACITY`].
    pub sent_messages: Vec<MessageRef>,
    /// Outbound messages recorded while this session was live.
    pub sent_total: u64,
    /// Free-form conversation data, currently the last-message snapshot.
    pub conversation: BTreeMap<String, String>,
}

impl UserSession {
    #[must_use]
    pub fn new(user_id: UserId, profile: UserProfile, now: u64) -> Self {
        Self {
            user_id,
            profile,
            active_since: now,
            last_activity: now,
            sent_messages: Vec::new(),
            sent_total: 0,
            conversation: BTreeMap::new(),
        }
    }

    /// Mark activity at `now`. Clock skew never moves `last_activity` backwards.
    pub fn touch(&mut self, now: u64) {
        self.last_activity = self.last_activity.max(now);
    }

    /// Remember `message` unless it is already recorded, dropping the
    /// oldest ref once the live list is full.
    pub fn push_outbound(&mut self, message: MessageRef) -> bool {
        if self.sent_messages.contains(&message) {
            return false;
        }
        if self.sent_messages.len() == LIVE_OUTBOUND_CAPACITY {
            self.sent_messages.remove(0);
        }
        self.sent_messages.push(message);
        self.sent_total += 1;
        true
    }

    pub fn record_snapshot(&mut self, snapshot: &MessageSnapshot) {
        self.conversation
            .insert(KEY_LAST_MESSAGE.into(), snapshot.preview.clone());
        self.conversation
            .insert(KEY_LAST_KIND.into(), snapshot.kind.as_str().into());
        self.conversation
            .insert(KEY_LAST_AT.into(), snapshot.at.to_string());
    }

    #[must_use]
    pub fn last_snapshot(&self) -> Option<MessageSnapshot> {
        Some(MessageSnapshot {
            preview: self.conversation.get(KEY_LAST_MESSAGE)?.clone(),
            kind: self.conversation.get(KEY_LAST_KIND)?.parse().ok()?,
            at: self.conversation.get(KEY_LAST_AT)?.parse().ok()?,
        })
    }

    /// Milliseconds since the last inbound message.
    #[must_use]
    pub fn idle_for(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_activity)
    }
}

/// The latest inbound message of a session in display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    /// Text, caption, or a placeholder such as `[Photo]`.
    pub preview: String,
    pub kind: MessageKind,
    pub at: u64,
}

impl MessageSnapshot {
    #[must_use]
    pub fn of(content: &Content, at: u64) -> Self {
        Self {
            preview: content.preview(),
            kind: content.kind(),
            at,
        }
    }
}
