use relaydesk_common::{Content, MessageRef, PeerId, UserId, UserProfile};

use crate::command::{Command, CommandError};

/// Who produced an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: PeerId,
    pub profile: UserProfile,
}

impl Sender {
    #[must_use]
    pub fn new(id: impl Into<PeerId>, profile: UserProfile) -> Self {
        Self {
            id: id.into(),
            profile,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.profile.label()
    }
}

/// Inline actions attached to every user notification in the shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Claim,
    DeleteHistory,
    Info,
    Block,
}

impl ActionKind {
    pub const ALL: [Self; 4] = [Self::Claim, Self::DeleteHistory, Self::Info, Self::Block];

    fn prefix(self) -> &'static str {
        match self {
            Self::Claim => "claim",
            Self::DeleteHistory => "delete",
            Self::Info => "info",
            Self::Block => "block",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Claim => "💬 Reply",
            Self::DeleteHistory => "🗑 Delete chat",
            Self::Info => "ℹ️ Info",
            Self::Block => "🚫 Block",
        }
    }

    /// Payload carried by the button, e.g. `claim:12345`.
    #[must_use]
    pub fn callback_data(self, user: UserId) -> String {
        format!("{}:{user}", self.prefix())
    }

    /// Parse a button payload. The legacy `reply_<id>` form maps to [`ActionKind::Claim`].
    #[must_use]
    pub fn parse_callback(data: &str) -> Option<(Self, UserId)> {
        if let Some(id) = data.strip_prefix("reply_") {
            return id.parse().ok().map(|user| (Self::Claim, user));
        }
        let (prefix, id) = data.split_once(':')?;
        let kind = Self::ALL.into_iter().find(|k| k.prefix() == prefix)?;
        id.parse().ok().map(|user| (kind, user))
    }
}

/// Shape of the notification an action button was pressed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationBody {
    /// A text message with this body.
    Text(String),
    /// A media message with this caption (possibly empty).
    Caption(Option<String>),
    /// Anything that has neither text nor a caption slot.
    Other,
}

/// The notification message an action originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRef {
    pub message: MessageRef,
    pub body: NotificationBody,
}

/// Everything the relay core reacts to.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A message written to the bot in a private chat.
    UserMessage { sender: Sender, content: Content },
    /// A message written by an operator, either inside the shared channel or
    /// privately to the bot.
    OperatorMessage {
        sender: Sender,
        content: Content,
        in_shared_channel: bool,
    },
    /// An inline button press on a user notification.
    OperatorAction {
        sender: Sender,
        action: ActionKind,
        target: UserId,
        action_id: String,
        notification: Option<NotificationRef>,
    },
    /// A recognised bot command with valid arguments.
    Command {
        sender: Sender,
        chat: PeerId,
        command: Command,
    },
    /// A recognised bot command whose arguments failed validation.
    InvalidCommand {
        sender: Sender,
        chat: PeerId,
        error: CommandError,
    },
    /// Periodic maintenance trigger.
    CleanupTick,
}

impl InboundEvent {
    /// Short label used in logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::OperatorMessage { .. } => "operator_message",
            Self::OperatorAction { .. } => "operator_action",
            Self::Command { .. } => "command",
            Self::InvalidCommand { .. } => "invalid_command",
            Self::CleanupTick => "cleanup_tick",
        }
    }
}
