//! Layered manager configuration.
//!
//! Layers, lowest first: built-in defaults, at most one configuration
//! document, then single-value `CONDUIT_*` overrides. The document is the
//! first of `$CONDUIT_CONFIG_PATH`, `$CONDUIT_CONFIG_JSON`, or a
//! `conduit.toml`/`conduit.json` found in the working directory or under
//! `config/`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use conduit_core::config::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_PATH_VAR: &str = "CONDUIT_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "CONDUIT_CONFIG_JSON";
pub const WORK_DIR_VAR: &str = "CONDUIT_WORK_DIR";
pub const BATCH_HINT_VAR: &str = "CONDUIT_DEFAULT_BATCH_HINT";
pub const MAX_BATCHES_VAR: &str = "CONDUIT_MAX_CONCURRENT_BATCHES";

const DEFAULT_FILES: [&str; 4] = [
    "conduit.toml",
    "conduit.json",
    "config/conduit.toml",
    "config/conduit.json",
];

/// Where the configuration document came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    /// No document; defaults plus environment overrides.
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Syntax of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// `.json` files are JSON; anything else is read as TOML.
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Settings for a process hosting connector coordinators.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Shared coordinator settings: common working directory, default batch
    /// hint and thread pool sizing.
    pub coordinator: CoordinatorConfig,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl ManagerConfig {
    /// Read `.env`, then build the configuration from its layers.
    ///
    /// A broken document or override is an error; a missing one is not.
    pub fn load_from_env() -> anyhow::Result<(Self, ConfigSource)> {
        load_dotenv()?;

        let (mut config, source) = match Document::locate()? {
            Some(document) => (document.parse()?, document.source),
            None => (Self::default(), ConfigSource::Default),
        };
        config.apply_env_overrides()?;

        debug!(
            target: "conduit::config",
            source = ?source,
            work_dir = %config.coordinator.work_dir.display(),
            "manager configuration loaded"
        );
        Ok((config, source))
    }

    /// Parse one document, picking the syntax from the file extension.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        Document::read(path.to_path_buf(), ConfigSource::File(path.into()))?
            .parse()
    }

    pub fn parse(text: &str, format: Format) -> anyhow::Result<Self> {
        match format {
            Format::Toml => toml::from_str(text).context("invalid TOML"),
            Format::Json => serde_json::from_str(text).context("invalid JSON"),
        }
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(work_dir) = env_value(WORK_DIR_VAR) {
            self.coordinator.work_dir = PathBuf::from(work_dir);
        }
        if let Some(hint) = env_parsed(BATCH_HINT_VAR)? {
            self.coordinator.default_batch_hint = hint;
        }
        if let Some(max) = env_parsed(MAX_BATCHES_VAR)? {
            self.coordinator.pool.max_concurrent_batches = max;
        }
        Ok(())
    }
}

struct Document {
    source: ConfigSource,
    format: Format,
    text: String,
}

impl Document {
    fn locate() -> anyhow::Result<Option<Self>> {
        if let Some(path) = env_value(CONFIG_PATH_VAR) {
            let path = PathBuf::from(path);
            return Self::read(path.clone(), ConfigSource::EnvPath(path))
                .map(Some);
        }

        if let Some(text) = env_value(CONFIG_JSON_VAR) {
            return Ok(Some(Self {
                source: ConfigSource::EnvInline,
                format: Format::Json,
                text,
            }));
        }

        DEFAULT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.is_file())
            .map(|path| Self::read(path.clone(), ConfigSource::File(path)))
            .transpose()
    }

    fn read(path: PathBuf, source: ConfigSource) -> anyhow::Result<Self> {
        let text = fs::read_to_string(&path).with_context(|| {
            format!("can't read conduit config at {}", path.display())
        })?;
        Ok(Self {
            source,
            format: Format::of(&path),
            text,
        })
    }

    fn origin(&self) -> String {
        match &self.source {
            ConfigSource::EnvPath(path) | ConfigSource::File(path) => {
                path.display().to_string()
            }
            ConfigSource::EnvInline => CONFIG_JSON_VAR.to_owned(),
            ConfigSource::Default => "defaults".to_owned(),
        }
    }

    fn parse(&self) -> anyhow::Result<ManagerConfig> {
        ManagerConfig::parse(&self.text, self.format).with_context(|| {
            format!("invalid conduit config from {}", self.origin())
        })
    }
}

fn load_dotenv() -> anyhow::Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => debug!(
            target: "conduit::config",
            path = %path.display(),
            "loaded .env file"
        ),
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err).context("failed to read .env file"),
    }
    Ok(())
}

/// Unset and blank variables both count as absent.
fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_value(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid {key}: {raw:?}"))
        })
        .transpose()
}
