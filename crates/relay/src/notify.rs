//! Text shown to users and operators.

use std::{fmt::Write as _, time::Duration};

use {
    relaydesk_channels::{ActionKind, Affordance, Affordances, COMMAND_LIST},
    relaydesk_common::{
        Content, MessageKind, OperatorId, UserId, UserProfile, text,
        time::{format_age, format_clock, format_ms},
    },
    relaydesk_routing::ReplyRoute,
    relaydesk_sessions::UserSession,
};

use crate::engine::{BroadcastReport, DeleteReport, Stats, SweepReport};

/// Sessions shown by `/sessions` before truncating.
const SESSION_LIST_LIMIT: usize = 20;
const PREVIEW_CHARS: usize = 40;
/// Room left in a notification for the claim suffix.
const CLAIM_RESERVE: usize = 320;
const OPERATOR_NAME_UNITS: usize = 64;

pub(crate) const RECEIPT_ACK: &str =
    "✅ Thank you! Your message has been received. We'll reply soon.";
pub(crate) const UNAUTHORIZED_ACTION: &str = "You are not authorized to perform this action.";
pub(crate) const UNAUTHORIZED_COMMAND: &str = "❌ Unauthorized access.";
pub(crate) const CANNOT_EDIT: &str = "Cannot edit this message type.";
pub(crate) const REPLY_FROM_GROUP: &str = "❌ Please reply from the group, not in private chat.";
pub(crate) const UNSUPPORTED_REPLY: &str = "⚠️ Please send a text or photo as a reply.";
pub(crate) const BLOCK_NOT_IMPLEMENTED: &str = "🚫 Blocking is not available yet.";
pub(crate) const CONVERSATION_CLOSED: &str = "🗑 This conversation was closed by support. \
     Send a new message any time to start again.";
pub(crate) const NO_ACTIVE_ROUTE: &str = "ℹ️ You are not replying to anyone.";

pub(crate) fn welcome(name: &str) -> String {
    format!("👋 Hello {name}!\n\nSend me your message and our team will reply soon.")
}

pub(crate) fn throttled(retry_after: Duration) -> String {
    format!(
        "⏳ You are sending messages too quickly. Please wait {}s and try again.",
        retry_after.as_secs().max(1)
    )
}

fn notification_title(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "📩 New message",
        MessageKind::Photo => "📷 New photo",
        MessageKind::Document => "📎 New document",
        MessageKind::Voice => "🎤 New voice message",
        MessageKind::Video => "🎬 New video",
        MessageKind::Audio => "🎵 New audio",
        MessageKind::Unsupported => "📦 New message (unsupported format)",
    }
}

fn user_label(profile: &UserProfile) -> String {
    let label = profile.label();
    match profile.handle.as_deref() {
        Some(handle) if !handle.is_empty() && !label.starts_with('@') => {
            format!("{label} (@{handle})")
        },
        _ => label,
    }
}

/// The shared-channel copy of a user's message: profile summary on top,
/// then the original text or media, shortened to leave room for a claim.
pub(crate) fn user_notification(session: &UserSession, content: &Content, now: u64) -> Content {
    let header = format!(
        "{}\n\n👤 User: {}\n🆔 ID: {}\n⏱️ Time: {}",
        notification_title(content.kind()),
        user_label(&session.profile),
        session.user_id,
        format_clock(now),
    );
    content.with_header_reserving(&header, CLAIM_RESERVE)
}

/// Action buttons attached to every user notification.
pub(crate) fn action_buttons(user: UserId) -> Affordances {
    let button = |kind: ActionKind| Affordance::new(kind.label(), kind.callback_data(user));
    Affordances::new()
        .row(vec![
            button(ActionKind::Claim),
            button(ActionKind::DeleteHistory),
        ])
        .row(vec![button(ActionKind::Info), button(ActionKind::Block)])
}

pub(crate) fn fallback_notice(profile: &UserProfile, content: &Content) -> String {
    let head = format!(
        "⚠️ Failed to send to group. Message from {}:\n\n",
        profile.label()
    );
    let body = content.body().unwrap_or("[Media]");
    let body = text::fit(body, text::TEXT_LIMIT.saturating_sub(text::units(&head)));
    format!("{head}{body}")
}

const CLAIM_MARKER: &str = "\n\nReplying to user ID:";

/// Notification text without a previous claim suffix.
pub(crate) fn strip_claim(text: &str) -> &str {
    text.split_once(CLAIM_MARKER).map_or(text, |(head, _)| head)
}

/// Appended to the claimed notification.
pub(crate) fn claim_suffix(operator: &str, user: UserId, last_message_at: Option<u64>) -> String {
    let last = last_message_at.map_or_else(|| "unknown".to_string(), format_ms);
    let operator = text::fit(operator, OPERATOR_NAME_UNITS);
    format!(
        "\n\nReplying to user ID: {user}\nClaimed by: {operator}\nLast message at: {last}\n\n\
         💬 Please type your reply (text or photo) in the group."
    )
}

pub(crate) fn claim_ack(user: UserId) -> String {
    format!("Replying to user {user}")
}

pub(crate) fn reply_header(operator: &str) -> String {
    format!("💌 Reply from support ({operator}):")
}

pub(crate) fn reply_confirmed(operator: &str, user: UserId) -> String {
    format!("✅ Reply sent. 📤 {operator} replied to user {user}.")
}

pub(crate) fn reply_failed(user: UserId, reason: &str) -> String {
    format!("❌ Could not deliver the reply to user {user}: {reason}\nThe reply route was closed.")
}

pub(crate) fn direct_reply_sent(user: UserId) -> String {
    format!("✅ Reply sent to user {user}.")
}

pub(crate) fn direct_reply_failed(user: UserId, reason: &str) -> String {
    format!("❌ Could not send to user {user}: {reason}")
}

pub(crate) fn route_cancelled(user: UserId) -> String {
    format!("✅ Stopped replying to user {user}.")
}

pub(crate) fn announcement(text: &str) -> Content {
    Content::text(format!("📢 Announcement from support:\n\n{text}"))
}

pub(crate) fn broadcast_summary(report: &BroadcastReport) -> String {
    format!(
        "📣 Broadcast finished: {} delivered, {} failed.",
        report.sent, report.failed
    )
}

pub(crate) fn delete_summary(user: UserId, report: &DeleteReport) -> String {
    if report.attempted() == 0 {
        return format!("🗑 Conversation with user {user} closed. No messages to delete.");
    }
    format!(
        "🗑 Conversation with user {user} closed. Deleted {} messages, {} failed.",
        report.deleted, report.failed
    )
}

pub(crate) fn sweep_summary(report: &SweepReport) -> String {
    format!(
        "🧹 Cleanup done: {} sessions evicted, {} routes expired, {} rate windows pruned.",
        report.sessions_evicted, report.routes_expired, report.windows_pruned
    )
}

pub(crate) fn user_info(session: &UserSession, operators: &[OperatorId], now: u64) -> String {
    let mut out = format!(
        "ℹ️ User info\n\n👤 Name: {}\n🔗 Handle: {}\n🆔 ID: {}\n📅 Active since: {}\n⏱️ Last activity: {} ({} ago)\n📨 Messages sent to user: {}",
        session.profile.label(),
        session
            .profile
            .handle
            .as_deref()
            .map_or_else(|| "none".to_string(), |h| format!("@{h}")),
        session.user_id,
        format_ms(session.active_since),
        format_ms(session.last_activity),
        format_age(session.last_activity, now),
        session.sent_total,
    );
    if let Some(snapshot) = session.last_snapshot() {
        let _ = write!(
            out,
            "\n💬 Last message: {}",
            truncate(&snapshot.preview, PREVIEW_CHARS)
        );
    }
    let bound = if operators.is_empty() {
        "nobody".to_string()
    } else {
        operators
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let _ = write!(out, "\n🔗 Replying operators: {bound}");
    out
}

pub(crate) fn session_list(sessions: &[UserSession], now: u64) -> String {
    if sessions.is_empty() {
        return "👥 No active sessions.".to_string();
    }
    let mut out = format!("👥 Active sessions ({}):", sessions.len());
    for session in sessions.iter().take(SESSION_LIST_LIMIT) {
        let preview = session
            .last_snapshot()
            .map(|s| truncate(&s.preview, PREVIEW_CHARS))
            .unwrap_or_default();
        let _ = write!(
            out,
            "\n• {} ({}), {} ago: {preview}",
            session.profile.label(),
            session.user_id,
            format_age(session.last_activity, now),
        );
    }
    if sessions.len() > SESSION_LIST_LIMIT {
        let _ = write!(out, "\n…and {} more", sessions.len() - SESSION_LIST_LIMIT);
    }
    out
}

pub(crate) fn route_list(routes: &[ReplyRoute], now: u64) -> String {
    if routes.is_empty() {
        return "🔗 No active reply routes.".to_string();
    }
    let mut out = format!("🔗 Active reply routes ({}):", routes.len());
    for route in routes {
        let _ = write!(
            out,
            "\n• operator {} → user {} (claimed {} ago, idle {})",
            route.operator_id,
            route.target,
            format_age(route.claimed_at, now),
            format_age(route.bound_at, now),
        );
    }
    out
}

pub(crate) fn stats(stats: &Stats) -> String {
    let mut out = format!(
        "📊 Relay statistics\n\n👥 Active sessions: {}\n🔗 Active routes: {}\n⏳ Rate windows tracked: {}\n🕒 Uptime: {}",
        stats.active_sessions,
        stats.active_routes,
        stats.tracked_windows,
        format_age(0, stats.uptime_ms),
    );
    match &stats.history {
        Some(counts) => {
            let _ = write!(
                out,
                "\n\n🗄 Stored sessions: {}\n🗄 Stored messages: {}\n🗄 Audit entries: {}",
                counts.sessions, counts.messages, counts.audit
            );
        },
        None => out.push_str("\n\n🗄 History database unavailable."),
    }
    out
}

pub(crate) fn admin_panel(stats: &Stats) -> String {
    format!(
        "🛠 Operator panel\n\n👥 {} active sessions, 🔗 {} active routes.\n\n{}",
        stats.active_sessions,
        stats.active_routes,
        help(true)
    )
}

pub(crate) fn help(operator: bool) -> String {
    if !operator {
        return "Send me a message, photo or file and our support team will reply here.\n\n/start - Start talking to support\n/help - Show this message".to_string();
    }
    let mut out = String::from("Available commands:");
    for (name, description) in COMMAND_LIST {
        let _ = write!(out, "\n/{name} - {description}");
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}
