//! Resolve command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tufmux_fetch::{BackendLocator, FileAddress, RepositoryKind};

use crate::output::{display_option, print_output};

use super::{qualify_address, CommandContext, RepositoryArgs};

/// Show where an address would be read from. Performs no I/O.
#[derive(Debug, Args)]
pub struct ResolveCommand {
    /// File address, or a name relative to the metadata repository.
    address: String,

    #[command(flatten)]
    repository: RepositoryArgs,

    /// Resolve relative names against the targets repository.
    #[arg(long)]
    target: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct ResolvedRow {
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "SCHEME")]
    scheme: String,
    #[tabled(rename = "VERSION", display = "display_option")]
    version: Option<u64>,
    #[tabled(rename = "HASH", display = "display_option")]
    hash_prefix: Option<String>,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "SOURCE")]
    source: &'static str,
    #[tabled(rename = "LOCATION")]
    location: String,
}

impl ResolveCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let fetch_config = ctx.fetch_config()?;
        let session = self.repository.open(&ctx, &fetch_config)?;

        let address = qualify_address(&session, &self.address, self.target);
        let locator = session.resolve(&address)?;

        let row = resolved_row(&address, session.kind(), &locator);
        print_output(&[row], ctx.format);
        Ok(())
    }
}

fn resolved_row(address: &str, kind: RepositoryKind, locator: &BackendLocator) -> ResolvedRow {
    let parsed = FileAddress::parse(address);

    let source = match locator {
        BackendLocator::Path(_) => "path",
        BackendLocator::Url(_) => "url",
        BackendLocator::Registry(_) => "registry",
    };

    ResolvedRow {
        address: parsed.to_string(),
        scheme: parsed.scheme().to_string(),
        version: parsed.version(),
        hash_prefix: parsed.hash_prefix().map(str::to_string),
        kind: kind.to_string(),
        source,
        location: locator.to_string(),
    }
}
