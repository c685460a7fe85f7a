//! Runtime configuration
//!
//! Layered with the `config` crate, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`lute.toml` in the working directory, or an explicit path)
//! 3. Environment variables prefixed `LUTE_` (e.g. `LUTE_STEP_BUDGET=64`)
//!
//! `LUTE_CONFIG_PATH` selects the file when no explicit path is given.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lute.toml";

const ENV_PREFIX: &str = "LUTE";
const CONFIG_PATH_VAR: &str = "LUTE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory named scripts are resolved against.
    pub script_root: PathBuf,
    /// Extension appended to named scripts that have none.
    pub script_extension: String,
    /// Steps a backgrounded context may run per tick; 0 is unlimited.
    pub step_budget: usize,
    /// Maximum nesting of synchronous script calls.
    pub max_call_depth: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            script_root: PathBuf::from("."),
            script_extension: "lute".to_string(),
            step_budget: 256,
            max_call_depth: 64,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load with the default file search.
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    /// Load from `path`, falling back to the default search when `None`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::builder()
            .config_path(path.map(Path::to_path_buf))
            .build()
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration as TOML")
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    script_root: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Explicit config file. A missing explicit file is an error.
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Overrides every other source for `script_root`.
    pub fn script_root(mut self, root: Option<PathBuf>) -> Self {
        self.script_root = root;
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default(
                "script_root",
                defaults.script_root.to_string_lossy().into_owned(),
            )?
            .set_default("script_extension", defaults.script_extension)?
            .set_default("step_budget", defaults.step_budget as u64)?
            .set_default("max_call_depth", defaults.max_call_depth as u64)?
            .set_default("log_filter", defaults.log_filter)?;

        let explicit = self
            .config_path
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from));
        builder = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder.add_source(config::File::from(path).format(config::FileFormat::Toml))
            }
            None => builder.add_source(
                config::File::with_name(DEFAULT_CONFIG_FILE)
                    .format(config::FileFormat::Toml)
                    .required(false),
            ),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .ignore_empty(true),
        );

        if let Some(root) = self.script_root {
            builder = builder.set_override("script_root", root.to_string_lossy().into_owned())?;
        }

        let config: Config = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.script_extension.starts_with('.') {
            anyhow::bail!(
                "script_extension must not start with '.': {}",
                config.script_extension
            );
        }
        Ok(config)
    }
}
