//! Archive directory path management
//!
//! This module provides the `ArchivePaths` struct which manages all filesystem
//! paths for the archive tree layout:
//!
//! ```text
//! pocs/
//! └── <year>/
//!     └── CVE-<year>-<seq>/
//!         ├── <owner>.zip          # Archive (or placeholder), mtime = updated_at
//!         └── .<owner>.branch      # Cached default branch name
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::types::{Exploit, Identifier};

/// Identifies one archive slot in the tree (identifier + owner login)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    pub identifier: Identifier,
    pub owner: String,
}

impl ArchiveKey {
    /// Creates a new ArchiveKey
    pub fn new(identifier: Identifier, owner: impl Into<String>) -> Self {
        Self {
            identifier,
            owner: owner.into(),
        }
    }
}

impl From<&Exploit> for ArchiveKey {
    fn from(exploit: &Exploit) -> Self {
        Self::new(exploit.identifier, exploit.descriptor.login())
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.identifier, self.owner)
    }
}

/// Manages all filesystem paths for the archive tree
#[derive(Debug, Clone)]
pub struct ArchivePaths {
    root: PathBuf,
}

impl ArchivePaths {
    /// Creates a new ArchivePaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the year directory: `{root}/{year}`
    pub fn year_dir(&self, identifier: &Identifier) -> PathBuf {
        self.root.join(identifier.year().to_string())
    }

    /// Returns the identifier directory: `{root}/{year}/{identifier}`
    pub fn identifier_dir(&self, identifier: &Identifier) -> PathBuf {
        self.year_dir(identifier).join(identifier.to_string())
    }

    /// Returns the archive path: `{root}/{year}/{identifier}/{owner}.zip`
    pub fn archive_path(&self, key: &ArchiveKey) -> PathBuf {
        self.identifier_dir(&key.identifier)
            .join(format!("{}.zip", key.owner))
    }

    /// Returns the cached branch sidecar: `{root}/{year}/{identifier}/.{owner}.branch`
    pub fn branch_sidecar(&self, key: &ArchiveKey) -> PathBuf {
        self.identifier_dir(&key.identifier)
            .join(format!(".{}.branch", key.owner))
    }
}
