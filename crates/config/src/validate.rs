//! Semantic validation of a loaded [`RelayConfig`].
//!
//! Parsing already rejects malformed files; this pass reports settings that
//! parse fine but would leave the relay unusable or surprising.

use std::path::PathBuf;

use crate::schema::RelayConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "limits", "timing"
    pub category: &'static str,
    /// Dotted path, e.g. "limits.max_messages"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.category, self.path, self.message
        )
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &str,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Check `config` and collect diagnostics.
pub fn validate(config: &RelayConfig, config_path: Option<PathBuf>) -> ValidationResult {
    let mut result = ValidationResult {
        diagnostics: Vec::new(),
        config_path,
    };

    if config.telegram.token.is_none() {
        result.push(
            Severity::Error,
            "missing",
            "telegram.token",
            "bot token is not set (config or RELAYDESK_TELEGRAM_TOKEN)",
        );
    }
    if config.telegram.shared_chat_id.is_none() {
        result.push(
            Severity::Error,
            "missing",
            "telegram.shared_chat_id",
            "shared operator chat is not set (config or RELAYDESK_SHARED_CHAT_ID)",
        );
    }
    if config.operators.all_ids().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "operators",
            "no operators configured; nobody could claim or reply",
        );
    }

    let limits = &config.limits;
    if limits.max_messages == 0 {
        result.push(
            Severity::Error,
            "limits",
            "limits.max_messages",
            "must be at least 1 or every user message is throttled",
        );
    }
    if limits.window_secs == 0 {
        result.push(
            Severity::Error,
            "limits",
            "limits.window_secs",
            "rate window must be non-zero",
        );
    }
    if limits.delivery_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "timing",
            "limits.delivery_timeout_secs",
            "a zero timeout fails every delivery",
        );
    }
    if limits.storage_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "timing",
            "limits.storage_timeout_secs",
            "a zero timeout disables durable history",
        );
    }
    if limits.broadcast_delay_ms == 0 {
        result.push(
            Severity::Info,
            "limits",
            "limits.broadcast_delay_ms",
            "broadcasts are not paced and may hit transport flood limits",
        );
    }

    let cleanup = &config.cleanup;
    if cleanup.interval_secs == 0 {
        result.push(
            Severity::Error,
            "timing",
            "cleanup.interval_secs",
            "cleanup interval must be non-zero",
        );
    }
    if cleanup.route_timeout_secs == 0 {
        result.push(
            Severity::Warning,
            "timing",
            "cleanup.route_timeout_secs",
            "routes expire on every sweep",
        );
    }
    if cleanup.session_inactivity_secs < cleanup.route_timeout_secs {
        result.push(
            Severity::Warning,
            "timing",
            "cleanup.session_inactivity_secs",
            "sessions are evicted before routes to them expire",
        );
    }

    result
}
