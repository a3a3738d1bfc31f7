//! Configuration loading, env substitution, overrides, and validation.
//!
//! Config files: `relaydesk.toml`, `relaydesk.yaml`, `relaydesk.yml`, or
//! `relaydesk.json`. Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config,
        parse_operator_list,
    },
    schema::{
        CleanupConfig, LimitsConfig, OperatorsConfig, RelayConfig, StorageConfig, TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
