use std::{error::Error as StdError, time::Duration};

use relaydesk_common::PeerId;

/// Crate-wide result type for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure reported by the transport when sending, editing or deleting.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient blocked the bot, left, or never started a chat.
    #[error("recipient {peer} is unreachable: {reason}")]
    Unreachable { peer: PeerId, reason: String },

    /// The target message no longer exists or cannot be changed.
    #[error("message cannot be modified: {reason}")]
    NotModifiable { reason: String },

    /// The transport did not answer in time.
    #[error("delivery timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },

    /// Input payload or parameter is invalid.
    #[error("invalid delivery input: {message}")]
    InvalidInput { message: String },

    /// Wrapped source error from the transport client.
    #[error("delivery failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl DeliveryError {
    #[must_use]
    pub fn unreachable(peer: impl Into<PeerId>, reason: impl std::fmt::Display) -> Self {
        Self::Unreachable {
            peer: peer.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn not_modifiable(reason: impl std::fmt::Display) -> Self {
        Self::NotModifiable {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::Timeout { after }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::NotModifiable { .. } => "not_modifiable",
            Self::Timeout { .. } => "timeout",
            Self::InvalidInput { .. } => "invalid_input",
            Self::External { .. } => "external",
        }
    }
}
