//! Config schema for the relay process.
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub operators: OperatorsConfig,
    pub limits: LimitsConfig,
    pub cleanup: CleanupConfig,
    pub storage: StorageConfig,
}

/// Transport credential and the shared operator chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
    /// Chat id of the group where operators see notifications and reply.
    pub shared_chat_id: Option<i64>,
}

/// Who is allowed to act as an operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorsConfig {
    /// Primary operator, always authorized.
    pub owner_id: Option<i64>,
    /// Additional operator ids.
    pub ids: Vec<i64>,
}

impl OperatorsConfig {
    /// Owner plus every listed id, deduplicated, owner first.
    pub fn all_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.owner_id.into_iter().collect();
        for id in &self.ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// Admission control and outbound pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Messages a user may send within `window_secs`.
    pub max_messages: usize,
    pub window_secs: u64,
    /// Pause between broadcast sends.
    pub broadcast_delay_ms: u64,
    pub delivery_timeout_secs: u64,
    pub storage_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            window_secs: 60,
            broadcast_delay_ms: 50,
            delivery_timeout_secs: 10,
            storage_timeout_secs: 5,
        }
    }
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn broadcast_delay(&self) -> Duration {
        Duration::from_millis(self.broadcast_delay_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

/// Periodic sweep of stale sessions and routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    /// Routes older than this are unbound.
    pub route_timeout_secs: u64,
    /// Sessions idle longer than this are evicted from memory.
    pub session_inactivity_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            route_timeout_secs: 30 * 60,
            session_inactivity_secs: 24 * 60 * 60,
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn route_timeout(&self) -> Duration {
        Duration::from_secs(self.route_timeout_secs)
    }

    pub fn session_inactivity(&self) -> Duration {
        Duration::from_secs(self.session_inactivity_secs)
    }
}

/// Durable history database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx connection string, e.g. `sqlite://relaydesk.db?mode=rwc`.
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://relaydesk.db?mode=rwc".into(),
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.limits.max_messages, 10);
        assert_eq!(cfg.limits.window(), Duration::from_secs(60));
        assert_eq!(cfg.limits.broadcast_delay(), Duration::from_millis(50));
        assert_eq!(cfg.cleanup.route_timeout(), Duration::from_secs(1800));
        assert_eq!(cfg.cleanup.session_inactivity(), Duration::from_secs(86_400));
        assert!(cfg.telegram.token.is_none());
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [limits]
            max_messages = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limits.max_messages, 3);
        assert_eq!(cfg.limits.window_secs, 60);
        assert_eq!(cfg.cleanup.interval_secs, 3600);
    }

    #[test]
    fn operator_ids_are_deduplicated_owner_first() {
        let ops = OperatorsConfig {
            owner_id: Some(5),
            ids: vec![7, 5, 9, 7],
        };
        assert_eq!(ops.all_ids(), vec![5, 7, 9]);
    }

    #[test]
    fn token_serializes_exposed() {
        let mut cfg = RelayConfig::default();
        cfg.telegram.token = Some(Secret::new("123:abc".into()));
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["telegram"]["token"], "123:abc");
    }
}
