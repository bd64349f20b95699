//! Registry credentials and authentication challenges.
//!
//! Credentials come from an ordered [`CredentialChain`]. The default chain is
//! the container-runtime credential store, then Google Cloud identity for
//! Artifact/Container Registry hosts, then the ECR credential helper. When no
//! provider has anything for a registry the client goes anonymous. Provider
//! failures are logged and skipped, never raised.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use super::reference::DOCKER_HUB;
use crate::config::FetchConfig;

/// Username a credential helper returns alongside an identity token.
const IDENTITY_TOKEN_USERNAME: &str = "<token>";

/// Username paired with a Google OAuth2 access token.
const GOOGLE_OAUTH_USERNAME: &str = "oauth2accesstoken";

/// Keys the Docker CLI may have stored Docker Hub credentials under.
const DOCKER_HUB_KEYS: &[&str] = &[
    "https://index.docker.io/v1/",
    "index.docker.io",
    "registry-1.docker.io",
    "docker.io",
];

/// Credential for one registry host.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Basic { username: String, password: String },
    /// OAuth2 refresh token, exchanged at the token endpoint.
    IdentityToken(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::IdentityToken(_) => f.write_str("IdentityToken(<redacted>)"),
        }
    }
}

/// Source of registry credentials.
pub trait CredentialProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Credential for `registry`, or `None` if this provider has none.
    fn resolve(&self, registry: &str) -> Option<Credential>;
}

/// Ordered list of providers; the first one with a credential wins.
#[derive(Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// A chain that never yields credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The default chain for `config`.
    pub fn from_config(config: &FetchConfig) -> Self {
        let docker_dir = config.docker_config_dir.clone().or_else(default_docker_dir);

        let mut providers: Vec<Arc<dyn CredentialProvider>> = Vec::new();
        if let Some(dir) = docker_dir {
            providers.push(Arc::new(DockerConfigProvider::from_dir(&dir)));
        }
        providers.push(Arc::new(GoogleCloudProvider));
        providers.push(Arc::new(EcrHelperProvider));

        Self { providers }
    }

    pub fn resolve(&self, registry: &str) -> Option<Credential> {
        for provider in &self.providers {
            if let Some(credential) = provider.resolve(registry) {
                debug!(registry = %registry, provider = provider.name(), "Resolved credentials");
                return Some(credential);
            }
        }
        debug!(registry = %registry, "No credentials found, using anonymous access");
        None
    }
}

impl fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

fn default_docker_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".docker"))
}

/// Container-runtime `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, AuthEntry>,
    #[serde(default)]
    pub cred_helpers: HashMap<String, String>,
    #[serde(default)]
    pub creds_store: Option<String>,
}

/// One `auths` entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthEntry {
    /// Base64 of `username:password`.
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub identitytoken: Option<String>,
}

impl AuthEntry {
    fn credential(&self) -> Option<Credential> {
        if let Some(token) = self.identitytoken.as_deref().filter(|t| !t.is_empty()) {
            return Some(Credential::IdentityToken(token.to_string()));
        }

        if let Some(encoded) = self.auth.as_deref().filter(|a| !a.is_empty()) {
            let decoded = match STANDARD.decode(encoded.trim()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(error = %e, "Ignoring undecodable auth entry");
                    return None;
                }
            };
            let decoded = String::from_utf8_lossy(&decoded);
            return match decoded.split_once(':') {
                Some((username, password)) => Some(Credential::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                }),
                None => {
                    warn!("Ignoring auth entry without ':' separator");
                    None
                }
            };
        }

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credential::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// Reads `config.json`: per-registry helpers, inline `auths`, then the
/// default `credsStore`.
#[derive(Debug, Clone, Default)]
pub struct DockerConfigProvider {
    config: DockerConfig,
}

impl DockerConfigProvider {
    /// Load `{dir}/config.json`. A missing or unreadable file yields an empty
    /// provider.
    pub fn from_dir(dir: &Path) -> Self {
        let path = dir.join("config.json");
        let config = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice(&data) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring malformed credential config");
                    DockerConfig::default()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No credential config");
                DockerConfig::default()
            }
        };
        Self { config }
    }

    pub fn with_config(config: DockerConfig) -> Self {
        Self { config }
    }

    fn lookup_keys(registry: &str) -> Vec<String> {
        if registry == DOCKER_HUB {
            return DOCKER_HUB_KEYS.iter().map(|k| k.to_string()).collect();
        }
        vec![
            registry.to_string(),
            format!("https://{registry}"),
            format!("http://{registry}"),
        ]
    }
}

impl CredentialProvider for DockerConfigProvider {
    fn name(&self) -> &'static str {
        "docker-config"
    }

    fn resolve(&self, registry: &str) -> Option<Credential> {
        let keys = Self::lookup_keys(registry);

        if let Some(helper) = keys.iter().find_map(|k| self.config.cred_helpers.get(k)) {
            return run_credential_helper(helper, registry);
        }

        if let Some(credential) = keys
            .iter()
            .filter_map(|k| self.config.auths.get(k))
            .find_map(AuthEntry::credential)
        {
            return Some(credential);
        }

        self.config
            .creds_store
            .as_deref()
            .filter(|store| !store.is_empty())
            .and_then(|store| run_credential_helper(store, registry))
    }
}

/// Google Artifact Registry and Container Registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleCloudProvider;

impl GoogleCloudProvider {
    pub fn matches(registry: &str) -> bool {
        let host = registry.split(':').next().unwrap_or(registry);
        host == "gcr.io" || host.ends_with(".gcr.io") || host.ends_with("-docker.pkg.dev")
    }

    fn access_token() -> Option<String> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                return Some(token.trim().to_string());
            }
        }

        let output = match Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!(error = %e, "gcloud not available");
                return None;
            }
        };

        if !output.status.success() {
            warn!(status = %output.status, "gcloud auth print-access-token failed");
            return None;
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

impl CredentialProvider for GoogleCloudProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn resolve(&self, registry: &str) -> Option<Credential> {
        if !Self::matches(registry) {
            return None;
        }
        Self::access_token().map(|token| Credential::Basic {
            username: GOOGLE_OAUTH_USERNAME.to_string(),
            password: token,
        })
    }
}

/// Amazon ECR via `docker-credential-ecr-login`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcrHelperProvider;

impl EcrHelperProvider {
    /// `{account}.dkr.ecr.{region}.amazonaws.com[.cn]`
    pub fn matches(registry: &str) -> bool {
        let host = registry.split(':').next().unwrap_or(registry);
        host.contains(".dkr.ecr.")
            && (host.ends_with(".amazonaws.com") || host.ends_with(".amazonaws.com.cn"))
    }
}

impl CredentialProvider for EcrHelperProvider {
    fn name(&self) -> &'static str {
        "ecr"
    }

    fn resolve(&self, registry: &str) -> Option<Credential> {
        if !Self::matches(registry) {
            return None;
        }
        run_credential_helper("ecr-login", registry)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HelperResponse {
    username: String,
    secret: String,
}

/// Run `docker-credential-{helper} get` with `registry` on stdin.
fn run_credential_helper(helper: &str, registry: &str) -> Option<Credential> {
    let program = format!("docker-credential-{helper}");

    let mut child = match Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(helper = %program, error = %e, "Credential helper unavailable");
            return None;
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(registry.as_bytes()) {
            warn!(helper = %program, error = %e, "Failed to write to credential helper");
        }
    }

    let output = match child.wait_with_output() {
        Ok(output) => output,
        Err(e) => {
            warn!(helper = %program, error = %e, "Credential helper failed");
            return None;
        }
    };

    if !output.status.success() {
        debug!(helper = %program, registry = %registry, "Credential helper has no entry");
        return None;
    }

    match serde_json::from_slice::<HelperResponse>(&output.stdout) {
        Ok(response) => Some(helper_credential(response)),
        Err(e) => {
            warn!(helper = %program, error = %e, "Malformed credential helper response");
            None
        }
    }
}

fn helper_credential(response: HelperResponse) -> Credential {
    if response.username == IDENTITY_TOKEN_USERNAME {
        Credential::IdentityToken(response.secret)
    } else {
        Credential::Basic {
            username: response.username,
            password: response.secret,
        }
    }
}

/// A parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    /// Parse `Bearer realm="…",service="…",scope="…"` or `Basic realm="…"`.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace).unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Challenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut params = parse_auth_params(rest);
        let realm = params.remove("realm")?;
        Some(Challenge::Bearer {
            realm,
            service: params.remove("service"),
            scope: params.remove("scope"),
        })
    }
}

/// Parse comma-separated `key=value` pairs; quoted values may contain commas.
fn parse_auth_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek().copied() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        params.insert(key, value);
    }

    params
}
