//! Convert command.
//!
//! Operates purely on local directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tufmux_layout::convert_layout;

use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Convert a git working-tree layout into the canonical layout.
#[derive(Debug, Args)]
pub struct ConvertCommand {
    /// Working tree holding `metadata/` and `targets/`.
    source: PathBuf,

    /// Output directory; created when missing.
    output: PathBuf,

    /// Write into a non-empty output directory.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct ConvertSummary {
    roles: Vec<String>,
    metadata_files: usize,
    target_files: usize,
    output: String,
}

impl ConvertCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        if !self.force && !is_empty_or_missing(&self.output)? {
            return Err(CliError::OutputNotEmpty(self.output.display().to_string()).into());
        }

        let source = self.source.clone();
        let output = self.output.clone();
        let report = tokio::task::spawn_blocking(move || convert_layout(&source, &output))
            .await
            .context("Conversion task failed")?
            .with_context(|| format!("Failed to convert {}", self.source.display()))?;

        match ctx.format {
            OutputFormat::Json => {
                let summary = ConvertSummary {
                    metadata_files: report.metadata_files.len(),
                    target_files: report.target_files.len(),
                    roles: report.roles,
                    output: self.output.display().to_string(),
                };
                print_single(&summary);
            }
            OutputFormat::Table => {
                print_success(&format!(
                    "Converted {} into {}",
                    self.source.display(),
                    self.output.display()
                ));
                print_info(&format!("roles: {}", report.roles.join(", ")));
                print_info(&format!(
                    "{} metadata files, {} target files",
                    report.metadata_files.len(),
                    report.target_files.len()
                ));
            }
        }

        Ok(())
    }
}

fn is_empty_or_missing(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    }
}
