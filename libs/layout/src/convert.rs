//! Conversion from the unversioned working-tree layout to the canonical one.
//!
//! Source layout:
//!
//! ```text
//! {source}/metadata/root_history/{N}.root.json
//! {source}/metadata/{timestamp,snapshot,targets}.json
//! {source}/metadata/{delegated-role}.json
//! {source}/targets/{target-path}
//! ```
//!
//! Output layout:
//!
//! ```text
//! {output}/metadata/{N}.root.json
//! {output}/metadata/timestamp.json
//! {output}/metadata/{N}.snapshot.json
//! {output}/metadata/{N}.{role}.json
//! {output}/targets/[{dir}/]{hash-hex}.{basename}
//! ```

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};
use tufmux_metadata::{
    hash_prefixed_name, versioned_file_name, RoleMetadata, Signed, SnapshotMetadata,
    TargetsMetadata, TopLevelRole, ROOT_HISTORY_DIR, TARGETS_ROLE,
};

use crate::error::LayoutError;

/// Name of the metadata directory in both layouts.
pub const METADATA_DIR: &str = "metadata";

/// Name of the targets directory in both layouts.
pub const TARGETS_DIR: &str = "targets";

/// What a successful conversion wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionReport {
    /// Roles processed, in traversal order.
    pub roles: Vec<String>,
    /// Metadata files written.
    pub metadata_files: Vec<PathBuf>,
    /// Target files written, one per (target, hash) pair.
    pub target_files: Vec<PathBuf>,
}

/// Converts one source layout into one output directory.
#[derive(Debug, Clone)]
pub struct LayoutConverter {
    source_metadata: PathBuf,
    source_targets: PathBuf,
    output_metadata: PathBuf,
    output_targets: PathBuf,
}

impl LayoutConverter {
    pub fn new(source: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let source = source.as_ref();
        let output = output.as_ref();
        Self {
            source_metadata: source.join(METADATA_DIR),
            source_targets: source.join(TARGETS_DIR),
            output_metadata: output.join(METADATA_DIR),
            output_targets: output.join(TARGETS_DIR),
        }
    }

    /// Run the conversion, stopping at the first missing input.
    pub fn convert(&self) -> Result<ConversionReport, LayoutError> {
        create_dir(&self.output_metadata)?;

        let mut report = ConversionReport::default();

        self.copy_root_history(&mut report)?;
        self.copy_timestamp(&mut report)?;
        self.copy_snapshot(&mut report)?;
        self.copy_delegation_graph(&mut report)?;

        info!(
            roles = report.roles.len(),
            metadata_files = report.metadata_files.len(),
            target_files = report.target_files.len(),
            output = %self.output_metadata.display(),
            "Layout converted"
        );

        Ok(report)
    }

    fn copy_root_history(&self, report: &mut ConversionReport) -> Result<(), LayoutError> {
        let history_dir = self.source_metadata.join(ROOT_HISTORY_DIR);
        let entries = fs::read_dir(&history_dir).map_err(|e| LayoutError::io(&history_dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LayoutError::io(&history_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".root.json") {
                names.push(name);
            }
        }
        names.sort();

        for name in names {
            let data = read(&history_dir.join(&name))?;
            report
                .metadata_files
                .push(write(&self.output_metadata.join(&name), &data)?);
        }

        Ok(())
    }

    fn copy_timestamp(&self, report: &mut ConversionReport) -> Result<(), LayoutError> {
        let name = TopLevelRole::Timestamp.file_name();
        let data = read(&self.source_metadata.join(&name))?;
        report
            .metadata_files
            .push(write(&self.output_metadata.join(&name), &data)?);
        Ok(())
    }

    fn copy_snapshot(&self, report: &mut ConversionReport) -> Result<(), LayoutError> {
        let path = self
            .source_metadata
            .join(TopLevelRole::Snapshot.file_name());
        let data = read(&path)?;
        let snapshot = Signed::<SnapshotMetadata>::from_slice(&data, &path)?;

        let name = TopLevelRole::Snapshot.versioned_file_name(snapshot.signed.version());
        report
            .metadata_files
            .push(write(&self.output_metadata.join(name), &data)?);
        Ok(())
    }

    /// Breadth-first walk from `targets`, writing each role and its targets.
    ///
    /// A role reached a second time (a shared child or a cycle) is skipped.
    fn copy_delegation_graph(&self, report: &mut ConversionReport) -> Result<(), LayoutError> {
        let mut queue = VecDeque::from([TARGETS_ROLE.to_string()]);
        let mut visited = HashSet::new();

        while let Some(role) = queue.pop_front() {
            if !visited.insert(role.clone()) {
                debug!(role = %role, "Role already converted, skipping");
                continue;
            }
            check_name("role", &role)?;

            let path = self.source_metadata.join(format!("{role}.json"));
            let data = read(&path)?;
            let metadata = Signed::<TargetsMetadata>::from_slice(&data, &path)?.signed;

            let output = self
                .output_metadata
                .join(versioned_file_name(metadata.version(), &role));
            report.metadata_files.push(write(&output, &data)?);

            for (target_path, descriptor) in &metadata.targets {
                self.copy_target(target_path, descriptor.hashes.values(), report)?;
            }

            debug!(role = %role, version = metadata.version(), targets = metadata.targets.len(), "Converted role");
            report.roles.push(role);
            queue.extend(metadata.delegated_role_names().map(str::to_string));
        }

        Ok(())
    }

    fn copy_target<'a>(
        &self,
        target_path: &str,
        hashes: impl Iterator<Item = &'a String>,
        report: &mut ConversionReport,
    ) -> Result<(), LayoutError> {
        check_name("target", target_path)?;

        let data = read(&self.source_targets.join(target_path))?;

        for hash in hashes {
            check_name("hash", hash)?;
            let output = self
                .output_targets
                .join(hash_prefixed_name(hash, target_path));
            if let Some(parent) = output.parent() {
                create_dir(parent)?;
            }
            report.target_files.push(write(&output, &data)?);
        }

        Ok(())
    }
}

/// Convert the layout under `source` into `output`.
pub fn convert_layout(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<ConversionReport, LayoutError> {
    LayoutConverter::new(source, output).convert()
}

/// Reject names that are empty, absolute, or climb out of their directory.
fn check_name(kind: &'static str, name: &str) -> Result<(), LayoutError> {
    let safe = !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(LayoutError::UnsafeName {
            kind,
            name: name.to_string(),
        })
    }
}

fn read(path: &Path) -> Result<Vec<u8>, LayoutError> {
    fs::read(path).map_err(|e| LayoutError::io(path, e))
}

fn write(path: &Path, data: &[u8]) -> Result<PathBuf, LayoutError> {
    fs::write(path, data).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), size = data.len(), "Wrote file");
    Ok(path.to_path_buf())
}

fn create_dir(path: &Path) -> Result<(), LayoutError> {
    fs::create_dir_all(path).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })
}
