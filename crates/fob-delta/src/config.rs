//! Layered configuration.
//!
//! Priority: environment variables > config file > defaults. The config file
//! is `fob-delta.toml` or `fob-delta.json` in the project root. Environment
//! variables use the `FOB_DELTA_` prefix and `__` between nested keys, e.g.
//! `FOB_DELTA_WATCH__DEBOUNCE_MS=50`.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized, Toml},
};
use fob_delta_graph::TransformInputOptions;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::logging::LogLevel;

pub const CONFIG_FILE_NAMES: [&str; 2] = ["fob-delta.toml", "fob-delta.json"];

const ENV_PREFIX: &str = "FOB_DELTA_";

const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Options of a [`DeltaCalculator`](crate::DeltaCalculator) that can come
/// from a file or the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Do not traverse async and prefetch imports.
    pub lazy: bool,
    /// Only process entry points.
    pub shallow: bool,
    /// Re-process context modules when files are added under them.
    pub unstable_allow_require_context: bool,
    pub transform: TransformInputOptions,
    /// Level installed by `logging::init_logging_from_config`.
    pub log_level: LogLevel,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before the watcher forwards a batch of changes.
    pub debounce_ms: u64,
    /// Extra ignore patterns, on top of `node_modules` and `.git`.
    pub ignore: Vec<String>,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            lazy: false,
            shallow: false,
            unstable_allow_require_context: false,
            transform: TransformInputOptions::default(),
            log_level: LogLevel::Info,
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            ignore: Vec::new(),
        }
    }
}

impl DeltaConfig {
    /// Load configuration for the project at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(find_config_file(root).as_deref())
    }

    /// Load configuration from an explicit file, or defaults and environment
    /// only when `config_file` is `None`.
    pub fn load_from(config_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        if let Some(path) = config_file {
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => figment.merge(Json::file(path)),
                Some("toml") => figment.merge(Toml::file(path)),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "config file".to_string(),
                        value: path.display().to_string(),
                        hint: "Use a .toml or .json file".to_string(),
                    }
                    .into());
                }
            };
        }

        // FOB_DELTA_LAZY, FOB_DELTA_WATCH__DEBOUNCE_MS, ...
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment.extract().map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::InvalidValue {
                field: "watch.debounce_ms".to_string(),
                value: self.watch.debounce_ms.to_string(),
                hint: format!("Use a debounce of at most {MAX_DEBOUNCE_MS}ms"),
            }
            .into());
        }

        if let Some(pattern) = self.watch.ignore.iter().find(|p| p.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "watch.ignore".to_string(),
                value: format!("{pattern:?}"),
                hint: "Ignore patterns cannot be empty".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// First config file present in `root`, if any.
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.exists())
}
