//! tufmux - resolve, convert, and inspect TUF repositories.
//!
//! Serves TUF files from filesystem, HTTP, git working-tree and OCI registry
//! repositories, and converts working-tree layouts to the canonical layout.

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod error;
mod logging;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.log_level(), cli.log_json())?;

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
