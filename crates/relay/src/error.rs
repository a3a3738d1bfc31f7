use std::time::Duration;

use {relaydesk_channels::DeliveryError, relaydesk_common::PeerId};

/// Why a relay operation did not complete as asked.
///
/// None of these are fatal: the engine logs them, tells the waiting human
/// when there is one, and leaves existing state alone.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The sender exceeded the admission window.
    #[error("too many messages, retry in {}s", retry_after.as_secs().max(1))]
    AdmissionDenied { retry_after: Duration },

    /// An operator-only action was attempted by someone else.
    #[error("{identity} is not an operator")]
    Unauthorized { identity: PeerId },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// The referenced session or route no longer exists.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The durable history sink rejected or timed out a call.
    #[error("persistence failure during {context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: relaydesk_sessions::Error,
    },

    /// The claimed notification has no text or caption that can be edited.
    #[error("notification cannot be edited")]
    CannotEdit,
}

impl RelayError {
    #[must_use]
    pub fn unauthorized(identity: impl Into<PeerId>) -> Self {
        Self::Unauthorized {
            identity: identity.into(),
        }
    }

    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    #[must_use]
    pub fn persistence(context: &'static str, source: relaydesk_sessions::Error) -> Self {
        Self::Persistence { context, source }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AdmissionDenied { .. } => "admission_denied",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Delivery(_) => "delivery",
            Self::NotFound { .. } => "not_found",
            Self::Persistence { .. } => "persistence",
            Self::CannotEdit => "cannot_edit",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
