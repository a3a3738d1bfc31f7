use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::RelayConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "relaydesk.toml",
    "relaydesk.yaml",
    "relaydesk.yml",
    "relaydesk.json",
];

pub const ENV_TOKEN: &str = "RELAYDESK_TELEGRAM_TOKEN";
pub const ENV_SHARED_CHAT: &str = "RELAYDESK_SHARED_CHAT_ID";
pub const ENV_OPERATORS: &str = "RELAYDESK_OPERATORS";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./relaydesk.{toml,yaml,yml,json}`
/// 2. `<user config dir>/relaydesk.{toml,yaml,yml,json}`
///
/// Returns `RelayConfig::default()` if no usable config file is found.
pub fn discover_and_load() -> RelayConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return RelayConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        RelayConfig::default()
    })
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "relaydesk").map(|d| d.config_dir().to_path_buf())
}

/// Overlay `RELAYDESK_*` environment variables onto `config`.
pub fn apply_env_overrides(config: &mut RelayConfig) -> Result<()> {
    apply_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_overrides_with(
    config: &mut RelayConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty()) {
        config.telegram.token = Some(Secret::new(token.trim().to_string()));
    }
    if let Some(raw) = lookup(ENV_SHARED_CHAT) {
        let id = raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{ENV_SHARED_CHAT} must be a chat id, got '{raw}'"))?;
        config.telegram.shared_chat_id = Some(id);
    }
    if let Some(raw) = lookup(ENV_OPERATORS) {
        let ids = parse_operator_list(&raw)?;
        if config.operators.owner_id.is_none() {
            config.operators.owner_id = ids.first().copied();
        }
        for id in ids {
            if !config.operators.ids.contains(&id) {
                config.operators.ids.push(id);
            }
        }
    }
    Ok(())
}

/// Parse a comma or whitespace separated list of numeric ids.
pub fn parse_operator_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .with_context(|| format!("invalid operator id '{part}'"))
        })
        .collect()
}

fn parse_config(raw: &str, path: &Path) -> Result<RelayConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "relaydesk.toml",
            r#"
            [telegram]
            token = "1:x"
            shared_chat_id = -1001

            [operators]
            owner_id = 10
            ids = [11, 12]

            [cleanup]
            route_timeout_secs = 600
            "#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.telegram.token.unwrap().expose_secret(), "1:x");
        assert_eq!(cfg.telegram.shared_chat_id, Some(-1001));
        assert_eq!(cfg.operators.all_ids(), vec![10, 11, 12]);
        assert_eq!(cfg.cleanup.route_timeout_secs, 600);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(&dir, "relaydesk.yaml", "limits:\n  max_messages: 4\n");
        assert_eq!(load_config(&yaml).unwrap().limits.max_messages, 4);

        let json = write(&dir, "relaydesk.json", r#"{"operators":{"ids":[3]}}"#);
        assert_eq!(load_config(&json).unwrap().operators.ids, vec![3]);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "relaydesk.ini", "x=1");
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn env_overrides_fill_credentials_and_operators() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_TOKEN, " 9:zz "),
            (ENV_SHARED_CHAT, "-42"),
            (ENV_OPERATORS, "7, 8 7"),
        ]);
        let mut cfg = RelayConfig::default();
        apply_overrides_with(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(cfg.telegram.token.as_ref().unwrap().expose_secret(), "9:zz");
        assert_eq!(cfg.telegram.shared_chat_id, Some(-42));
        assert_eq!(cfg.operators.owner_id, Some(7));
        assert_eq!(cfg.operators.all_ids(), vec![7, 8]);
    }

    #[test]
    fn bad_shared_chat_override_is_an_error() {
        let mut cfg = RelayConfig::default();
        let err = apply_overrides_with(&mut cfg, |k| {
            (k == ENV_SHARED_CHAT).then(|| "group".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_SHARED_CHAT));
    }

    #[test]
    fn operator_list_rejects_garbage() {
        assert_eq!(parse_operator_list("1,2 ,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_operator_list("1,bob").is_err());
        assert!(parse_operator_list("").unwrap().is_empty());
    }
}
