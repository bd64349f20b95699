//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;
use tufmux_fetch::{FetchError, FetchErrorKind};
use tufmux_layout::LayoutError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("No metadata location given. Use --metadata-url or set TUFMUX_METADATA_URL.")]
    MissingRepository,

    #[error("Output directory {0} is not empty")]
    OutputNotEmpty(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::MissingRepository => {
                Some("Set `metadata_url` in the config file to avoid repeating it.")
            }
            CliError::OutputNotEmpty(_) => Some("Pass --force to write into it anyway."),
        };
    }

    if let Some(fetch_err) = err.downcast_ref::<FetchError>() {
        return match fetch_err.kind() {
            FetchErrorKind::NotFound => {
                Some("Check the address with `tufmux resolve` to see where it is looked up.")
            }
            FetchErrorKind::LengthMismatch => Some("Raise the limit with --max-length."),
            FetchErrorKind::Transport => Some(
                "Check network access and registry credentials (docker login, gcloud, ECR helper).",
            ),
            FetchErrorKind::Configuration => {
                Some("The address must sit under the configured metadata or targets location.")
            }
        };
    }

    if let Some(layout_err) = err.downcast_ref::<LayoutError>() {
        return match layout_err {
            LayoutError::MissingInput { .. } => Some(
                "The source must contain metadata/root_history, timestamp.json, snapshot.json and every role file. Discard the partial output.",
            ),
            _ => Some("Discard the partial output directory before retrying."),
        };
    }

    None
}
