//! CLI commands.

mod convert;
mod fetch;
mod inspect;
mod resolve;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tufmux_fetch::{FetchConfig, RepositoryKind, RepositorySession};

use crate::config::Config;
use crate::error::CliError;
use crate::logging::DEFAULT_LOG_LEVEL;
use crate::output::OutputFormat;

/// tufmux - resolve, convert, and inspect TUF repositories.
#[derive(Debug, Parser)]
#[command(name = "tufmux")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Log level used when RUST_LOG is unset.
    #[arg(long, global = true, env = "TUFMUX_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch one file through a repository backend.
    Fetch(fetch::FetchCommand),

    /// Show where an address would be read from, without fetching it.
    Resolve(resolve::ResolveCommand),

    /// Convert a working-tree layout to the canonical layout.
    Convert(convert::ConvertCommand),

    /// Inspect roles, targets, or delegations of a local metadata directory.
    Inspect(inspect::InspectCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_json(&self) -> bool {
        self.log_json
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config = Config::load()?;

        let ctx = CommandContext {
            config,
            format: self.format,
        };

        match self.command {
            Commands::Fetch(cmd) => cmd.run(ctx).await,
            Commands::Resolve(cmd) => cmd.run(ctx).await,
            Commands::Convert(cmd) => cmd.run(ctx).await,
            Commands::Inspect(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("tufmux {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: Config,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Backend configuration from config file and environment.
    pub fn fetch_config(&self) -> Result<FetchConfig> {
        self.config.fetch_config()
    }
}

/// Repository location flags shared by `fetch` and `resolve`.
#[derive(Debug, Args)]
pub struct RepositoryArgs {
    /// Metadata location: a directory, an http(s) URL, or oci://registry/repo.
    #[arg(long, env = "TUFMUX_METADATA_URL")]
    metadata_url: Option<String>,

    /// Targets location. Defaults to the `targets` sibling of the metadata
    /// location; required for registries.
    #[arg(long, env = "TUFMUX_TARGETS_URL")]
    targets_url: Option<String>,

    /// Treat the metadata directory as a git working-tree layout.
    #[arg(long)]
    git_layout: bool,
}

impl RepositoryArgs {
    /// Open a session, preferring flags over the config file.
    pub fn open(&self, ctx: &CommandContext, fetch: &FetchConfig) -> Result<RepositorySession> {
        let metadata_url = self
            .metadata_url
            .as_deref()
            .or(ctx.config.metadata_url.as_deref())
            .ok_or(CliError::MissingRepository)?;
        let targets_url = self
            .targets_url
            .as_deref()
            .or(ctx.config.targets_url.as_deref());
        let kind = self.git_layout.then_some(RepositoryKind::GitLayout);

        let session = RepositorySession::open(metadata_url, targets_url, kind, fetch)?;
        Ok(session)
    }
}

/// Turn a bare name into an address inside the session's repositories.
///
/// Absolute addresses are used unchanged. Relative names go to the targets
/// repository when `target` is set and to the metadata repository otherwise.
pub fn qualify_address(session: &RepositorySession, address: &str, target: bool) -> String {
    let absolute = address.contains("://") || address.starts_with('/');
    if absolute {
        address.to_string()
    } else if target {
        session.target_address(address)
    } else {
        session.metadata_address(address)
    }
}
