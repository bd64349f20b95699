//! Read-only view of a repository's delegation graph.
//!
//! Works on both layouts: a role is read from `{role}.json` when present,
//! otherwise from the highest `{N}.{role}.json` in the directory.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use tufmux_metadata::{
    parse_versioned_name, DelegatedRole, Signed, TargetsMetadata, METADATA_EXTENSION,
    TARGETS_ROLE,
};

use crate::error::LayoutError;

/// A delegated role and the roles it delegates to in turn.
#[derive(Debug, Clone)]
pub struct DelegationNode {
    pub role: DelegatedRole,
    /// Version of the role's metadata, if its file was found.
    pub version: Option<u64>,
    pub children: Vec<DelegationNode>,
}

/// A targets role loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedRole {
    pub name: String,
    pub path: PathBuf,
    pub metadata: TargetsMetadata,
}

/// The delegation graph rooted at the top-level `targets` role.
#[derive(Debug, Clone)]
pub struct DelegationTree {
    /// Roles delegated to directly by `targets`.
    pub roots: Vec<DelegationNode>,
    /// Every role that was loaded, `targets` first, in depth-first order.
    pub loaded: Vec<LoadedRole>,
}

impl DelegationTree {
    /// Load the graph from a metadata directory.
    ///
    /// The top-level `targets` role must exist. Delegated roles whose files
    /// are absent appear as leaves without a version. A role reached a second
    /// time is listed again but not expanded.
    pub fn load(metadata_dir: &Path) -> Result<Self, LayoutError> {
        let files = RoleFiles::scan(metadata_dir)?;

        let path = files
            .find(TARGETS_ROLE)
            .ok_or_else(|| LayoutError::MissingInput {
                path: metadata_dir.join(format!("{TARGETS_ROLE}{METADATA_EXTENSION}")),
            })?;
        let targets = Signed::<TargetsMetadata>::from_file(&path)?.signed;

        let mut builder = Builder {
            files,
            visited: HashSet::from([TARGETS_ROLE.to_string()]),
            loaded: Vec::new(),
        };
        let roots = builder.children(&targets)?;

        let mut loaded = vec![LoadedRole {
            name: TARGETS_ROLE.to_string(),
            path,
            metadata: targets,
        }];
        loaded.append(&mut builder.loaded);

        Ok(Self { roots, loaded })
    }

    /// Iterate over all nodes, depth first, with their depth.
    pub fn walk(&self) -> Vec<(usize, &DelegationNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &DelegationNode)> =
            self.roots.iter().rev().map(|n| (0, n)).collect();

        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));
            stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
        }

        out
    }
}

struct Builder {
    files: RoleFiles,
    visited: HashSet<String>,
    loaded: Vec<LoadedRole>,
}

impl Builder {
    fn children(&mut self, parent: &TargetsMetadata) -> Result<Vec<DelegationNode>, LayoutError> {
        let Some(delegations) = &parent.delegations else {
            return Ok(Vec::new());
        };

        let mut nodes = Vec::with_capacity(delegations.roles.len());
        for role in &delegations.roles {
            nodes.push(self.node(role)?);
        }
        Ok(nodes)
    }

    fn node(&mut self, role: &DelegatedRole) -> Result<DelegationNode, LayoutError> {
        let leaf = |version| DelegationNode {
            role: role.clone(),
            version,
            children: Vec::new(),
        };

        if !self.visited.insert(role.name.clone()) {
            debug!(role = %role.name, "Role already visited");
            return Ok(leaf(None));
        }

        let Some(path) = self.files.find(&role.name) else {
            debug!(role = %role.name, "No metadata file for delegated role");
            return Ok(leaf(None));
        };

        let metadata = Signed::<TargetsMetadata>::from_file(&path)?.signed;
        let children = self.children(&metadata)?;
        let version = Some(metadata.version);

        self.loaded.push(LoadedRole {
            name: role.name.clone(),
            path,
            metadata,
        });

        Ok(DelegationNode {
            role: role.clone(),
            version,
            children,
        })
    }
}

/// Index of the metadata files present in one directory.
#[derive(Debug, Default)]
pub struct RoleFiles {
    dir: PathBuf,
    unversioned: HashSet<String>,
    latest: BTreeMap<String, u64>,
}

impl RoleFiles {
    pub fn scan(dir: &Path) -> Result<Self, LayoutError> {
        let entries = fs::read_dir(dir).map_err(|e| LayoutError::io(dir, e))?;

        let mut files = RoleFiles {
            dir: dir.to_path_buf(),
            ..Default::default()
        };

        for entry in entries {
            let entry = entry.map_err(|e| LayoutError::io(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(METADATA_EXTENSION) {
                continue;
            }

            let parsed = parse_versioned_name(&name);
            match parsed.version {
                Some(version) => {
                    let latest = files.latest.entry(parsed.role).or_insert(version);
                    *latest = (*latest).max(version);
                }
                None => {
                    files.unversioned.insert(parsed.role);
                }
            }
        }

        Ok(files)
    }

    /// Path of the file to read for `role`, if any.
    pub fn find(&self, role: &str) -> Option<PathBuf> {
        if self.unversioned.contains(role) {
            return Some(self.dir.join(format!("{role}{METADATA_EXTENSION}")));
        }
        self.latest.get(role).map(|version| {
            self.dir
                .join(format!("{version}.{role}{METADATA_EXTENSION}"))
        })
    }
}
