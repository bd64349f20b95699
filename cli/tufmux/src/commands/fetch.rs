//! Fetch command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::output::{print_single, print_success, OutputFormat};

use super::{qualify_address, CommandContext, RepositoryArgs};

/// Fetch one file.
///
/// With `--format table` and no `--output`, the raw bytes go to stdout.
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// File address, or a name relative to the metadata repository.
    address: String,

    #[command(flatten)]
    repository: RepositoryArgs,

    /// Resolve relative names against the targets repository.
    #[arg(long)]
    target: bool,

    /// Largest accepted file size in bytes.
    #[arg(long)]
    max_length: Option<u64>,

    /// Request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the file here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FetchSummary {
    address: String,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    sha256: String,
}

impl FetchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let fetch_config = ctx.fetch_config()?;
        let mut session = self.repository.open(&ctx, &fetch_config)?;

        let address = qualify_address(&session, &self.address, self.target);
        let max_length = self.max_length.unwrap_or(fetch_config.max_length);
        let timeout = self
            .timeout_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(fetch_config.timeout);

        let data = session
            .fetch(&address, max_length, timeout)
            .await
            .with_context(|| format!("Failed to fetch {address}"))?;

        info!(address = %address, bytes = data.len(), "Fetched file");

        if let Some(path) = &self.output {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        match ctx.format {
            OutputFormat::Json => {
                let summary = FetchSummary {
                    address,
                    bytes: data.len(),
                    path: self.output.as_ref().map(|p| p.display().to_string()),
                    sha256: hex::encode(Sha256::digest(&data)),
                };
                print_single(&summary);
            }
            OutputFormat::Table => match &self.output {
                Some(path) => print_success(&format!(
                    "Wrote {} bytes to {}",
                    data.len(),
                    path.display()
                )),
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            },
        }

        Ok(())
    }
}
