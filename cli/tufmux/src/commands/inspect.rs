//! Inspect command.
//!
//! Reads a local metadata directory (either layout). Nothing is verified.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::Tabled;
use tufmux_layout::{DelegationTree, RoleFiles};
use tufmux_metadata::{
    RoleMetadata, RootMetadata, Signed, SnapshotMetadata, TargetsMetadata, TimestampMetadata,
    TopLevelRole, ROOT_HISTORY_DIR,
};

use crate::output::{display_option, print_output};

use super::CommandContext;

/// Number of hex digits of the sha256 shown in the targets view.
const HASH_PREFIX_LEN: usize = 12;

/// Inspect a metadata directory.
#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Metadata directory.
    metadata_dir: PathBuf,

    /// What to show.
    #[arg(value_enum, default_value = "roles")]
    view: View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum View {
    /// Top-level role versions and expiry.
    Roles,
    /// Targets declared by every loaded targets role.
    Targets,
    /// The delegation tree.
    Delegations,
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "VERSION", display = "display_option")]
    version: Option<u64>,
    #[tabled(rename = "EXPIRES", display = "display_option")]
    expires: Option<DateTime<Utc>>,
    #[tabled(rename = "EXPIRED")]
    expired: bool,
    #[tabled(rename = "FILE", display = "display_option")]
    file: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct TargetRow {
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "LENGTH")]
    length: u64,
    #[tabled(rename = "SHA256", display = "display_option")]
    sha256: Option<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct DelegationRow {
    #[tabled(rename = "ROLE")]
    role: String,
    #[tabled(skip)]
    depth: usize,
    #[tabled(rename = "VERSION", display = "display_option")]
    version: Option<u64>,
    #[tabled(rename = "THRESHOLD")]
    threshold: u32,
    #[tabled(rename = "PATHS")]
    paths: String,
    #[tabled(rename = "TERMINATING")]
    terminating: bool,
}

impl InspectCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let dir = self.metadata_dir;
        match self.view {
            View::Roles => print_output(&role_rows(&dir, Utc::now())?, ctx.format),
            View::Targets => print_output(&target_rows(&dir)?, ctx.format),
            View::Delegations => print_output(&delegation_rows(&dir)?, ctx.format),
        }
        Ok(())
    }
}

fn role_rows(dir: &Path, now: DateTime<Utc>) -> Result<Vec<RoleRow>> {
    let files = RoleFiles::scan(dir)?;
    let history = dir.join(ROOT_HISTORY_DIR);
    let history_files = if history.is_dir() {
        Some(RoleFiles::scan(&history)?)
    } else {
        None
    };

    let mut rows = Vec::with_capacity(TopLevelRole::ALL.len());
    for role in TopLevelRole::ALL {
        let mut path = files.find(role.as_str());
        if path.is_none() && role == TopLevelRole::Root {
            path = history_files.as_ref().and_then(|f| f.find(role.as_str()));
        }

        let summary = match &path {
            Some(path) => Some(match role {
                TopLevelRole::Root => summarize::<RootMetadata>(path)?,
                TopLevelRole::Timestamp => summarize::<TimestampMetadata>(path)?,
                TopLevelRole::Snapshot => summarize::<SnapshotMetadata>(path)?,
                TopLevelRole::Targets => summarize::<TargetsMetadata>(path)?,
            }),
            None => None,
        };

        rows.push(RoleRow {
            role: role.to_string(),
            version: summary.map(|(version, _)| version),
            expires: summary.map(|(_, expires)| expires),
            expired: summary.is_some_and(|(_, expires)| expires <= now),
            file: path.map(|p| p.display().to_string()),
        });
    }

    Ok(rows)
}

fn summarize<T: RoleMetadata>(path: &Path) -> Result<(u64, DateTime<Utc>)> {
    let doc = Signed::<T>::from_file(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    Ok((doc.signed.version(), doc.signed.expires()))
}

fn target_rows(dir: &Path) -> Result<Vec<TargetRow>> {
    let tree = DelegationTree::load(dir)?;

    let rows = tree
        .loaded
        .iter()
        .flat_map(|role| {
            role.metadata.targets.iter().map(|(name, target)| TargetRow {
                role: role.name.clone(),
                name: name.clone(),
                length: target.length,
                sha256: target
                    .hashes
                    .get("sha256")
                    .map(|hash| hash.chars().take(HASH_PREFIX_LEN).collect()),
            })
        })
        .collect();

    Ok(rows)
}

fn delegation_rows(dir: &Path) -> Result<Vec<DelegationRow>> {
    let tree = DelegationTree::load(dir)?;

    let rows = tree
        .walk()
        .into_iter()
        .map(|(depth, node)| DelegationRow {
            role: format!("{}{}", "  ".repeat(depth), node.role.name),
            depth,
            version: node.version,
            threshold: node.role.threshold,
            paths: node
                .role
                .paths
                .as_ref()
                .map(|paths| paths.join(","))
                .or_else(|| {
                    node.role
                        .path_hash_prefixes
                        .as_ref()
                        .map(|prefixes| format!("hash:{}", prefixes.join(",")))
                })
                .unwrap_or_default(),
            terminating: node.role.terminating,
        })
        .collect();

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write(dir: &Path, name: &str, signed: serde_json::Value) {
        let doc = json!({ "signed": signed, "signatures": [] });
        fs::write(dir.join(name), serde_json::to_vec(&doc).unwrap()).unwrap();
    }

    fn record(role_type: &str, version: u64, expires: &str) -> serde_json::Value {
        json!({
            "_type": role_type,
            "spec_version": "1.0.31",
            "version": version,
            "expires": expires,
        })
    }

    fn git_layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let meta = dir.path();
        fs::create_dir(meta.join(ROOT_HISTORY_DIR)).unwrap();

        let mut root = record("root", 1, "2030-01-01T00:00:00Z");
        root["keys"] = json!({});
        root["roles"] = json!({});
        write(&meta.join(ROOT_HISTORY_DIR), "1.root.json", root.clone());
        root["version"] = json!(2);
        write(&meta.join(ROOT_HISTORY_DIR), "2.root.json", root);

        let mut timestamp = record("timestamp", 9, "2000-01-01T00:00:00Z");
        timestamp["meta"] = json!({});
        write(meta, "timestamp.json", timestamp);

        let mut targets = record("targets", 4, "2030-01-01T00:00:00Z");
        targets["targets"] = json!({
            "file.txt": { "length": 5, "hashes": { "sha256": "ab".repeat(32) } }
        });
        targets["delegations"] = json!({
            "keys": {},
            "roles": [{ "name": "team", "keyids": [], "threshold": 2,
                        "paths": ["team/*"], "terminating": true }]
        });
        write(meta, "targets.json", targets);

        let mut team = record("targets", 3, "2030-01-01T00:00:00Z");
        team["targets"] = json!({ "team/a.bin": { "length": 1, "hashes": {} } });
        write(meta, "team.json", team);

        dir
    }

    #[test]
    fn roles_view_reads_root_history_and_flags_expiry() {
        let dir = git_layout();
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();

        let rows = role_rows(dir.path(), now).unwrap();
        let by_role = |name: &str| rows.iter().find(|r| r.role == name).unwrap();

        assert_eq!(by_role("root").version, Some(2));
        assert!(by_role("root").file.as_deref().unwrap().ends_with("2.root.json"));
        assert_eq!(by_role("timestamp").version, Some(9));
        assert!(by_role("timestamp").expired);
        assert_eq!(by_role("snapshot").version, None);
        assert!(!by_role("snapshot").expired);
        assert_eq!(by_role("targets").version, Some(4));
    }

    #[test]
    fn targets_view_covers_delegated_roles() {
        let dir = git_layout();
        let rows = target_rows(dir.path()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].role, "targets");
        assert_eq!(rows[0].sha256.as_deref(), Some("abababababab"));
        assert_eq!(rows[1].role, "team");
        assert_eq!(rows[1].sha256, None);
    }

    #[test]
    fn delegations_view_lists_tree() {
        let dir = git_layout();
        let rows = delegation_rows(dir.path()).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, "team");
        assert_eq!(rows[0].version, Some(3));
        assert_eq!(rows[0].threshold, 2);
        assert_eq!(rows[0].paths, "team/*");
        assert!(rows[0].terminating);
    }
}
