use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    relaydesk_config::{RelayConfig, Severity, ValidationResult},
};

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Load `explicit` when given, otherwise the first discovered config file,
/// then overlay `RELAYDESK_*` environment variables.
///
/// Returns the config together with the path it was read from.
pub fn load(explicit: Option<&Path>) -> Result<(RelayConfig, Option<PathBuf>)> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(relaydesk_config::find_config_file);
    let mut config = match &path {
        Some(path) => relaydesk_config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RelayConfig::default(),
    };
    relaydesk_config::apply_env_overrides(&mut config)?;
    Ok((config, path))
}

/// Load and validate, returning diagnostics for printing.
pub fn validate(explicit: Option<&Path>) -> Result<(RelayConfig, ValidationResult)> {
    let (config, path) = load(explicit)?;
    let result = relaydesk_config::validate(&config, path);
    Ok((config, result))
}

pub fn check(explicit: Option<&Path>, verbose: bool) -> Result<()> {
    let (_, result) = validate(explicit)?;

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults and environment.\n");
    }

    let shown = print_diagnostics(&result, verbose);

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if shown > 0 {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Print diagnostics to stderr, skipping `Info` unless `verbose`.
/// Returns how many were printed.
pub fn print_diagnostics(result: &ValidationResult, verbose: bool) -> usize {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }

        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
            Severity::Info => (CYAN, "info"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
        shown += 1;
    }
    shown
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn explicit_path_is_loaded_and_reported() {
        let file = write_config(
            r#"
            [telegram]
            token = "123:abc"
            shared_chat_id = -100500

            [operators]
            owner_id = 1
            ids = [2, 3]

            [limits]
            max_messages = 4
            "#,
        );

        let (config, path) = load(Some(file.path())).unwrap();
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(config.telegram.shared_chat_id, Some(-100500));
        assert_eq!(config.limits.max_messages, 4);
        assert!(config.operators.all_ids().starts_with(&[1]));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }

    #[test]
    fn zero_limits_are_diagnosed() {
        let file = write_config(
            r#"
            [telegram]
            token = "123:abc"
            shared_chat_id = -1

            [operators]
            owner_id = 1

            [limits]
            max_messages = 0
            "#,
        );

        let (_, result) = validate(Some(file.path())).unwrap();
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.path == "limits.max_messages")
        );
    }
}
