use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, text};

macro_rules! chat_identity {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($kind, s))
            }
        }
    };
}

chat_identity!(
    /// Any addressable chat: an end user, an operator, or the shared channel.
    PeerId,
    "peer"
);
chat_identity!(
    /// Stable identity of an end user talking to support.
    UserId,
    "user"
);
chat_identity!(
    /// Identity of a human operator.
    OperatorId,
    "operator"
);

impl PeerId {
    #[must_use]
    pub fn as_user(self) -> UserId {
        UserId(self.0)
    }

    #[must_use]
    pub fn as_operator(self) -> OperatorId {
        OperatorId(self.0)
    }
}

impl From<UserId> for PeerId {
    fn from(id: UserId) -> Self {
        Self(id.0)
    }
}

impl From<OperatorId> for PeerId {
    fn from(id: OperatorId) -> Self {
        Self(id.0)
    }
}

/// Informational profile reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn new(display_name: Option<String>, handle: Option<String>) -> Self {
        Self {
            display_name,
            handle,
        }
    }

    /// Best human-readable label: display name, then `@handle`, then a placeholder.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        match self.handle.as_deref() {
            Some(handle) if !handle.is_empty() => format!("@{handle}"),
            _ => "Unknown user".to_string(),
        }
    }
}

/// Reference to a message the transport has delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat: PeerId,
    pub message_id: i32,
}

impl MessageRef {
    #[must_use]
    pub fn new(chat: impl Into<PeerId>, message_id: i32) -> Self {
        Self {
            chat: chat.into(),
            message_id,
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.message_id)
    }
}

/// Shape of a message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Document,
    Voice,
    Video,
    Audio,
    Unsupported,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Document => "document",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Unsupported => "unsupported",
        }
    }

    /// Placeholder shown where the payload itself cannot be rendered as text.
    #[must_use]
    pub fn placeholder(self) -> &'static str {
        match self {
            Self::Text => "[Text]",
            Self::Photo => "[Photo]",
            Self::Document => "[Document]",
            Self::Voice => "[Voice message]",
            Self::Video => "[Video]",
            Self::Audio => "[Audio]",
            Self::Unsupported => "[Media]",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => Self::Text,
            "photo" => Self::Photo,
            "document" => Self::Document,
            "voice" => Self::Voice,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "unsupported" => Self::Unsupported,
            other => return Err(Error::UnknownKind(other.to_string())),
        })
    }
}

/// Closed set of payloads the relay understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Photo {
        file_id: String,
        caption: Option<String>,
    },
    Document {
        file_id: String,
        caption: Option<String>,
        file_name: Option<String>,
    },
    Voice {
        file_id: String,
        caption: Option<String>,
    },
    Video {
        file_id: String,
        caption: Option<String>,
    },
    Audio {
        file_id: String,
        caption: Option<String>,
    },
    Unsupported {
        description: String,
    },
}

impl Content {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Photo { .. } => MessageKind::Photo,
            Self::Document { .. } => MessageKind::Document,
            Self::Voice { .. } => MessageKind::Voice,
            Self::Video { .. } => MessageKind::Video,
            Self::Audio { .. } => MessageKind::Audio,
            Self::Unsupported { .. } => MessageKind::Unsupported,
        }
    }

    /// Text body or media caption, if any.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        let body = match self {
            Self::Text { text } => Some(text.as_str()),
            Self::Photo { caption, .. }
            | Self::Document { caption, .. }
            | Self::Voice { caption, .. }
            | Self::Video { caption, .. }
            | Self::Audio { caption, .. } => caption.as_deref(),
            Self::Unsupported { .. } => None,
        };
        body.filter(|b| !b.trim().is_empty())
    }

    /// Text when present, otherwise a kind placeholder such as `[Photo]`.
    #[must_use]
    pub fn preview(&self) -> String {
        self.body()
            .map(str::to_string)
            .unwrap_or_else(|| self.kind().placeholder().to_string())
    }

    /// Whether this payload can be re-sent to another chat.
    #[must_use]
    pub fn is_relayable(&self) -> bool {
        match self {
            Self::Text { text } => !text.trim().is_empty(),
            Self::Unsupported { .. } => false,
            _ => true,
        }
    }

    /// Length limit for [`Self::body`] once sent.
    #[must_use]
    pub fn body_limit(&self) -> usize {
        match self {
            Self::Text { .. } | Self::Unsupported { .. } => text::TEXT_LIMIT,
            _ => text::CAPTION_LIMIT,
        }
    }

    /// Prefix the payload with `header`: text is joined below the header,
    /// media keeps its file and gets the header prepended to its caption.
    /// The body is shortened so the result fits [`Self::body_limit`].
    #[must_use]
    pub fn with_header(&self, header: &str) -> Self {
        self.with_header_reserving(header, 0)
    }

    /// Like [`Self::with_header`], keeping `reserve` units free for text
    /// appended later.
    #[must_use]
    pub fn with_header_reserving(&self, header: &str, reserve: usize) -> Self {
        let budget = self
            .body_limit()
            .saturating_sub(reserve + text::units(header) + 2);
        let join = |body: Option<&str>| match body.filter(|b| !b.trim().is_empty()) {
            Some(body) => format!("{header}\n\n{}", text::fit(body, budget)),
            None => header.to_string(),
        };
        match self {
            Self::Text { text } => Self::Text {
                text: join(Some(text)),
            },
            Self::Photo { file_id, caption } => Self::Photo {
                file_id: file_id.clone(),
                caption: Some(join(caption.as_deref())),
            },
            Self::Document {
                file_id,
                caption,
                file_name,
            } => Self::Document {
                file_id: file_id.clone(),
                caption: Some(join(caption.as_deref())),
                file_name: file_name.clone(),
            },
            Self::Voice { file_id, caption } => Self::Voice {
                file_id: file_id.clone(),
                caption: Some(join(caption.as_deref())),
            },
            Self::Video { file_id, caption } => Self::Video {
                file_id: file_id.clone(),
                caption: Some(join(caption.as_deref())),
            },
            Self::Audio { file_id, caption } => Self::Audio {
                file_id: file_id.clone(),
                caption: Some(join(caption.as_deref())),
            },
            Self::Unsupported { .. } => Self::Text {
                text: header.to_string(),
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!(" -1002 ".parse::<PeerId>().unwrap(), PeerId(-1002));
        assert!(matches!(
            "abc".parse::<OperatorId>(),
            Err(Error::InvalidId { kind: "operator", .. })
        ));
    }

    #[test]
    fn profile_label_fallbacks() {
        let full = UserProfile::new(Some("Alice Doe".into()), Some("alice".into()));
        assert_eq!(full.label(), "Alice Doe");
        let handle_only = UserProfile::new(Some("  ".into()), Some("alice".into()));
        assert_eq!(handle_only.label(), "@alice");
        assert_eq!(UserProfile::default().label(), "Unknown user");
    }

    #[test]
    fn preview_uses_placeholder_for_bare_media() {
        let photo = Content::Photo {
            file_id: "f".into(),
            caption: None,
        };
        assert_eq!(photo.preview(), "[Photo]");
        let captioned = Content::Photo {
            file_id: "f".into(),
            caption: Some("look".into()),
        };
        assert_eq!(captioned.preview(), "look");
        assert_eq!(Content::text("hi").preview(), "hi");
    }

    #[test]
    fn header_goes_into_caption_for_media() {
        let voice = Content::Voice {
            file_id: "v1".into(),
            caption: Some("listen".into()),
        };
        assert_eq!(voice.with_header("From support"), Content::Voice {
            file_id: "v1".into(),
            caption: Some("From support\n\nlisten".into()),
        });
        assert_eq!(
            Content::text("hello").with_header("From support"),
            Content::text("From support\n\nhello")
        );
        assert_eq!(
            Content::Unsupported {
                description: "sticker".into()
            }
            .with_header("New message"),
            Content::text("New message")
        );
    }

    #[test]
    fn header_shortens_long_bodies() {
        let long = Content::text("x".repeat(text::TEXT_LIMIT));
        let Content::Text { text: joined } = long.with_header_reserving("New message", 200) else {
            panic!("text stays text");
        };
        assert_eq!(text::units(&joined), text::TEXT_LIMIT - 200);
        assert!(joined.starts_with("New message\n\nxxx"));
        assert!(joined.ends_with(text::ELLIPSIS));

        let photo = Content::Photo {
            file_id: "p".into(),
            caption: Some("y".repeat(2000)),
        };
        let caption = photo.with_header("From support").body().unwrap().to_string();
        assert_eq!(text::units(&caption), text::CAPTION_LIMIT);
    }

    #[test]
    fn relayable_content() {
        assert!(Content::text("x").is_relayable());
        assert!(!Content::text("   ").is_relayable());
        assert!(
            !Content::Unsupported {
                description: "poll".into()
            }
            .is_relayable()
        );
    }

    #[test]
    fn kind_roundtrips_through_str() {
        for kind in [
            MessageKind::Text,
            MessageKind::Photo,
            MessageKind::Document,
            MessageKind::Voice,
            MessageKind::Video,
            MessageKind::Audio,
            MessageKind::Unsupported,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
    }
}
