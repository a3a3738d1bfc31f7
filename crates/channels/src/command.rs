//! Bot command surface.
//!
//! Parsing only: each command maps to exactly one relay call, and argument
//! validation is the only logic that lives here.

use relaydesk_common::UserId;

/// A recognised command with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Admin,
    Sessions,
    Cleanup,
    Stats,
    Broadcast { text: String },
    Cancel,
    Routes,
    Reply { user: UserId, text: String },
}

/// Why a recognised command was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Usage: {usage}")]
    MissingArgument { usage: &'static str },

    #[error("'{value}' is not a valid user id. Usage: {usage}")]
    InvalidUserId { value: String, usage: &'static str },
}

/// `(name, description)` pairs registered with the transport for autocomplete.
pub const COMMAND_LIST: &[(&str, &str)] = &[
    ("start", "Start talking to support"),
    ("help", "Show available commands"),
    ("admin", "Operator panel"),
    ("sessions", "List active user sessions"),
    ("routes", "List operators currently replying"),
    ("cancel", "Stop replying to the claimed user"),
    ("reply", "Reply to a user by id"),
    ("broadcast", "Message every active user"),
    ("stats", "Show relay statistics"),
    ("cleanup", "Sweep stale sessions and routes now"),
];

const BROADCAST_USAGE: &str = "/broadcast <text>";
const REPLY_USAGE: &str = "/reply <user_id> <message>";

impl Command {
    /// Parse `input` as a command.
    ///
    /// Returns `None` when the text is not one of our commands (so it can be
    /// relayed as a normal message), `Some(Err(_))` when a known command has
    /// bad arguments.
    #[must_use]
    pub fn parse(input: &str) -> Option<Result<Self, CommandError>> {
        let rest = input.trim_start().strip_prefix('/')?;
        let (head, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim()),
            None => (rest, ""),
        };
        // Group chats append the bot username: `/stats@relay_bot`.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        let parsed = match name.as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "admin" => Ok(Self::Admin),
            "sessions" => Ok(Self::Sessions),
            "cleanup" => Ok(Self::Cleanup),
            "stats" => Ok(Self::Stats),
            "cancel" => Ok(Self::Cancel),
            "routes" => Ok(Self::Routes),
            "broadcast" => {
                if args.is_empty() {
                    Err(CommandError::MissingArgument {
                        usage: BROADCAST_USAGE,
                    })
                } else {
                    Ok(Self::Broadcast {
                        text: args.to_string(),
                    })
                }
            },
            "reply" => parse_reply(args),
            _ => return None,
        };
        Some(parsed)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Admin => "admin",
            Self::Sessions => "sessions",
            Self::Cleanup => "cleanup",
            Self::Stats => "stats",
            Self::Broadcast { .. } => "broadcast",
            Self::Cancel => "cancel",
            Self::Routes => "routes",
            Self::Reply { .. } => "reply",
        }
    }

    /// Whether only configured operators may run this command.
    #[must_use]
    pub fn requires_operator(&self) -> bool {
        !matches!(self, Self::Start | Self::Help)
    }
}

fn parse_reply(args: &str) -> Result<Command, CommandError> {
    let (id, text) = match args.find(char::is_whitespace) {
        Some(idx) => (&args[..idx], args[idx..].trim()),
        None => (args, ""),
    };
    if id.is_empty() || text.is_empty() {
        return Err(CommandError::MissingArgument { usage: REPLY_USAGE });
    }
    let user = id.parse::<UserId>().map_err(|_| CommandError::InvalidUserId {
        value: id.to_string(),
        usage: REPLY_USAGE,
    })?;
    Ok(Command::Reply {
        user,
        text: text.to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("/start", Command::Start)]
    #[case("/help", Command::Help)]
    #[case("/admin", Command::Admin)]
    #[case("/sessions", Command::Sessions)]
    #[case("/cleanup", Command::Cleanup)]
    #[case("/stats@relay_bot", Command::Stats)]
    #[case("/CANCEL", Command::Cancel)]
    #[case("  /routes  ", Command::Routes)]
    fn parses_bare_commands(#[case] input: &str, #[case] expected: Command) {
        assert_eq!(Command::parse(input), Some(Ok(expected)));
    }

    #[test]
    fn broadcast_keeps_multiline_text() {
        assert_eq!(
            Command::parse("/broadcast  Maintenance tonight\nBack at 6am "),
            Some(Ok(Command::Broadcast {
                text: "Maintenance tonight\nBack at 6am".into()
            }))
        );
    }

    #[test]
    fn broadcast_requires_text() {
        assert_eq!(
            Command::parse("/broadcast   "),
            Some(Err(CommandError::MissingArgument {
                usage: BROADCAST_USAGE
            }))
        );
    }

    #[test]
    fn reply_parses_id_and_text() {
        assert_eq!(
            Command::parse("/reply 6814 thanks, fixed now"),
            Some(Ok(Command::Reply {
                user: UserId(6814),
                text: "thanks, fixed now".into()
            }))
        );
    }

    #[rstest]
    #[case("/reply")]
    #[case("/reply 42")]
    fn reply_requires_both_arguments(#[case] input: &str) {
        assert!(matches!(
            Command::parse(input),
            Some(Err(CommandError::MissingArgument { .. }))
        ));
    }

    #[test]
    fn reply_rejects_bad_id() {
        assert!(matches!(
            Command::parse("/reply bob hi"),
            Some(Err(CommandError::InvalidUserId { value, .. })) if value == "bob"
        ));
    }

    #[test]
    fn unknown_commands_and_plain_text_are_not_commands() {
        assert_eq!(Command::parse("/weather"), None);
        assert_eq!(Command::parse("hello /start"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn only_start_and_help_are_public() {
        assert!(!Command::Start.requires_operator());
        assert!(!Command::Help.requires_operator());
        assert!(Command::Stats.requires_operator());
        assert!(
            Command::Reply {
                user: UserId(1),
                text: "x".into()
            }
            .requires_operator()
        );
    }
}
