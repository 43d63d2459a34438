//! Config file and environment overrides.

use std::path::PathBuf;

use capfix_core::{ServiceConfig, SuggestConfig};
use serde::Deserialize;

/// Contents of `config.toml`. Every table and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub suggest: SuggestConfig,
    pub service: ServiceConfig,
}

/// Returns the path to the capfix config file.
///
/// Prefers `$XDG_CONFIG_HOME/capfix/config.toml`; falls back to
/// `~/.config/capfix/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("capfix").join("config.toml")
}

/// Loads the config file, then applies environment overrides.
///
/// A missing file means defaults. A file that fails to parse is logged and
/// ignored, never fatal.
pub fn load() -> FileConfig {
    let path = config_path();
    let config = match std::fs::read_to_string(&path) {
        Ok(raw) => parse(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "config parse error; using defaults");
            FileConfig::default()
        }),
        Err(_) => FileConfig::default(),
    };
    with_env_overrides(config, |key| std::env::var(key).ok())
}

pub fn parse(raw: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(raw)
}

/// `OPENAI_API_URL` replaces the endpoint and `OPENAI_MODEL` the model.
/// Blank values are ignored.
pub fn with_env_overrides(mut config: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> FileConfig {
    let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    if let Some(endpoint) = value("OPENAI_API_URL") {
        config.service.endpoint = endpoint;
    }
    if let Some(model) = value("OPENAI_MODEL") {
        config.suggest.model = model;
    }
    config.suggest = config.suggest.sanitized();
    config
}
