//! CLI configuration.
//!
//! Precedence, lowest first: built-in defaults, the JSON config file in the
//! platform config directory, `TUFMUX_*` environment variables, then
//! command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tufmux_fetch::FetchConfig;

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("io", "tufmux", "tufmux")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default metadata location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,

    /// Default targets location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    /// Registries spoken to over plain HTTP.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub insecure_registries: Vec<String>,
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Backend configuration: environment over file over defaults.
    pub fn fetch_config(&self) -> Result<FetchConfig> {
        let mut fetch = FetchConfig::from_env().context("Invalid TUFMUX_* environment")?;
        self.apply_unless_env(&mut fetch, |name| std::env::var_os(name).is_some());
        Ok(fetch)
    }

    fn apply_unless_env(&self, fetch: &mut FetchConfig, env_set: impl Fn(&str) -> bool) {
        if !env_set("TUFMUX_TIMEOUT_SECS") {
            if let Some(secs) = self.timeout_secs {
                fetch.timeout = Duration::from_secs(secs.max(1));
            }
        }
        if !env_set("TUFMUX_MAX_LENGTH") {
            if let Some(max_length) = self.max_length {
                fetch.max_length = max_length;
            }
        }
        if !env_set("TUFMUX_INSECURE_REGISTRIES") && !self.insecure_registries.is_empty() {
            fetch.insecure_registries = self.insecure_registries.clone();
        }
    }
}
