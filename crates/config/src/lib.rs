//! Configuration loading, validation, env substitution, and env overrides.
//!
//! Config files: `linkfetch.toml`, `linkfetch.yaml`, or `linkfetch.json`
//! Searched in `./` then `~/.config/linkfetch/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    env::{apply_env_overrides, substitute_env},
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{
        DeliveryConfig, DownloadsConfig, ExtractorConfig, LinkfetchConfig, NetworkConfig,
        TelegramConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
