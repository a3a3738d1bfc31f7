//! Update classification: Telegram messages and button presses become
//! [`InboundEvent`]s. Nothing here talks to the network.

use {
    relaydesk_channels::{
        ActionKind, Command, InboundEvent, NotificationBody, NotificationRef, OperatorSet, Sender,
    },
    relaydesk_common::{Content, MessageRef, PeerId, UserProfile},
    teloxide::types::{CallbackQuery, MediaKind, Message, MessageKind, User},
    tracing::debug,
};

/// What the classifier needs to know about the deployment.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub shared_chat: PeerId,
    pub operators: OperatorSet,
}

impl UpdateContext {
    pub fn new(shared_chat: PeerId, operators: OperatorSet) -> Self {
        Self {
            shared_chat,
            operators,
        }
    }
}

fn sender_of(user: &User) -> Option<Sender> {
    let id = i64::try_from(user.id.0).ok()?;
    let name = match user.last_name.as_deref() {
        Some(last) => format!("{} {last}", user.first_name),
        None => user.first_name.clone(),
    };
    let name = name.trim();
    let profile = UserProfile::new(
        (!name.is_empty()).then(|| name.to_string()),
        user.username.clone(),
    );
    Some(Sender::new(PeerId(id), profile))
}

/// Classify an inbound message.
///
/// - commands (ours only) anywhere the bot can see them
/// - operators in the shared chat or in private are operator messages
/// - anyone else in private is a user message
/// - everything else is ignored
pub fn classify_message(msg: &Message, ctx: &UpdateContext) -> Option<InboundEvent> {
    let from = msg.from.as_ref().filter(|u| !u.is_bot)?;
    let sender = sender_of(from)?;
    let chat = PeerId(msg.chat.id.0);
    let in_shared_channel = chat == ctx.shared_chat;
    if !in_shared_channel && !msg.chat.is_private() {
        debug!(chat_id = %chat, "ignoring message from unrelated chat");
        return None;
    }

    if let Some(text) = msg.text()
        && text.starts_with('/')
    {
        return match Command::parse(text) {
            Some(Ok(command)) => Some(InboundEvent::Command {
                sender,
                chat,
                command,
            }),
            Some(Err(error)) => Some(InboundEvent::InvalidCommand {
                sender,
                chat,
                error,
            }),
            None => {
                debug!(chat_id = %chat, "ignoring unknown command");
                None
            },
        };
    }

    let content = extract_content(msg)?;
    if ctx.operators.is_operator(sender.id) {
        return Some(InboundEvent::OperatorMessage {
            sender,
            content,
            in_shared_channel,
        });
    }
    if in_shared_channel {
        // Non-operators chatting in the shared channel are not our business.
        return None;
    }
    Some(InboundEvent::UserMessage { sender, content })
}

/// Classify a button press. Unknown callback data yields `None`.
pub fn classify_callback(query: &CallbackQuery) -> Option<InboundEvent> {
    let data = query.data.as_deref()?;
    let Some((action, target)) = ActionKind::parse_callback(data) else {
        debug!(data, "ignoring unknown callback data");
        return None;
    };
    let sender = sender_of(&query.from)?;
    let notification = query.regular_message().map(|msg| NotificationRef {
        message: MessageRef::new(PeerId(msg.chat.id.0), msg.id.0),
        body: notification_body(msg),
    });
    Some(InboundEvent::OperatorAction {
        sender,
        action,
        target,
        action_id: query.id.clone(),
        notification,
    })
}

/// What part of a notification can be rewritten in place.
fn notification_body(msg: &Message) -> NotificationBody {
    let MessageKind::Common(common) = &msg.kind else {
        return NotificationBody::Other;
    };
    match &common.media_kind {
        MediaKind::Text(t) => NotificationBody::Text(t.text.clone()),
        MediaKind::Photo(p) => NotificationBody::Caption(p.caption.clone()),
        MediaKind::Document(d) => NotificationBody::Caption(d.caption.clone()),
        MediaKind::Video(v) => NotificationBody::Caption(v.caption.clone()),
        MediaKind::Audio(a) => NotificationBody::Caption(a.caption.clone()),
        MediaKind::Voice(v) => NotificationBody::Caption(v.caption.clone()),
        MediaKind::Animation(a) => NotificationBody::Caption(a.caption.clone()),
        _ => NotificationBody::Other,
    }
}

/// Extract the relay payload. Service messages yield `None`; media the relay
/// cannot forward becomes [`Content::Unsupported`].
pub fn extract_content(msg: &Message) -> Option<Content> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };
    let content = match &common.media_kind {
        MediaKind::Text(t) => Content::text(t.text.clone()),
        MediaKind::Photo(p) => {
            // Largest size is last.
            let photo = p.photo.last()?;
            Content::Photo {
                file_id: photo.file.id.clone(),
                caption: p.caption.clone(),
            }
        },
        MediaKind::Document(d) => Content::Document {
            file_id: d.document.file.id.clone(),
            caption: d.caption.clone(),
            file_name: d.document.file_name.clone(),
        },
        MediaKind::Voice(v) => Content::Voice {
            file_id: v.voice.file.id.clone(),
            caption: v.caption.clone(),
        },
        MediaKind::Video(v) => Content::Video {
            file_id: v.video.file.id.clone(),
            caption: v.caption.clone(),
        },
        MediaKind::Audio(a) => Content::Audio {
            file_id: a.audio.file.id.clone(),
            caption: a.caption.clone(),
        },
        other => Content::Unsupported {
            description: describe_media_kind(other).to_string(),
        },
    };
    Some(content)
}

fn describe_media_kind(kind: &MediaKind) -> &'static str {
    match kind {
        MediaKind::Animation(_) => "animation",
        MediaKind::Contact(_) => "contact",
        MediaKind::Game(_) => "game",
        MediaKind::Location(_) => "location",
        MediaKind::Poll(_) => "poll",
        MediaKind::Sticker(_) => "sticker",
        MediaKind::Venue(_) => "venue",
        MediaKind::VideoNote(_) => "video note",
        _ => "media",
    }
}
