//! Fetch configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::FetchError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum file size accepted by callers that do not pass one.
pub const DEFAULT_MAX_LENGTH: u64 = 32 * 1024 * 1024; // 32 MiB

/// Backend configuration (env-driven).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Timeout for callers that do not supply their own.
    pub timeout: Duration,

    /// Maximum length for callers that do not supply their own.
    pub max_length: u64,

    /// User-Agent sent on HTTP and registry requests.
    pub user_agent: String,

    /// Registries spoken to over plain HTTP. Loopback hosts always are.
    pub insecure_registries: Vec<String>,

    /// Directory holding the container-runtime `config.json`.
    pub docker_config_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_length: DEFAULT_MAX_LENGTH,
            user_agent: default_user_agent(),
            insecure_registries: Vec::new(),
            docker_config_dir: None,
        }
    }
}

fn default_user_agent() -> String {
    format!("tufmux/{}", env!("CARGO_PKG_VERSION"))
}

impl FetchConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, FetchError> {
        let timeout_secs: u64 = parse_env("TUFMUX_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_TIMEOUT.as_secs())
            .max(1);

        let max_length = parse_env("TUFMUX_MAX_LENGTH")?.unwrap_or(DEFAULT_MAX_LENGTH);

        let user_agent =
            std::env::var("TUFMUX_USER_AGENT").unwrap_or_else(|_| default_user_agent());

        let insecure_registries = std::env::var("TUFMUX_INSECURE_REGISTRIES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let docker_config_dir = std::env::var("DOCKER_CONFIG").ok().map(PathBuf::from);

        Ok(Self {
            timeout: Duration::from_secs(timeout_secs),
            max_length,
            user_agent,
            insecure_registries,
            docker_config_dir,
        })
    }

    /// Returns true if `registry` should be contacted over plain HTTP.
    pub fn is_insecure(&self, registry: &str) -> bool {
        let host = registry
            .rsplit_once(':')
            .filter(|(_, port)| port.bytes().all(|b| b.is_ascii_digit()))
            .map(|(host, _)| host)
            .unwrap_or(registry);

        matches!(host, "localhost" | "127.0.0.1" | "[::1]")
            || self.insecure_registries.iter().any(|r| r == registry)
    }
}

fn parse_env(name: &str) -> Result<Option<u64>, FetchError> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().parse::<u64>())
        .transpose()
        .map_err(|_| FetchError::configuration(format!("{name} must be a non-negative integer")))
}
