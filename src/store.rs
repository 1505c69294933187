//! Persistent sync state.
//!
//! The archive tree is the only state this tool keeps: a sidecar file per
//! (identifier, owner) remembers the default branch and the archive's mtime
//! records which upstream update it reflects. `SyncStore` is the seam over
//! that layout so the resolver, fetcher and driver never touch paths directly.

use std::io::{self, BufRead, BufReader, BufWriter, Write};

use crate::atomic::atomic_write;
use crate::fetch::FetchError;
use crate::paths::{ArchiveKey, ArchivePaths};
use crate::staleness::{modified_unix, stamp_file};

/// Writes an archive payload, returning the number of bytes written.
pub type ArchiveFill<'f> = dyn FnMut(&mut dyn Write) -> Result<u64, FetchError> + 'f;

/// Key-value view of the sync state for one archive slot.
pub trait SyncStore: Send + Sync {
    /// The remembered default branch, if one was stored.
    fn cached_branch(&self, key: &ArchiveKey) -> io::Result<Option<String>>;

    /// Remember the default branch for `key`.
    fn save_branch(&self, key: &ArchiveKey, branch: &str) -> io::Result<()>;

    /// Unix time the archive for `key` was last stamped with, if it exists.
    fn freshness_marker(&self, key: &ArchiveKey) -> io::Result<Option<i64>>;

    /// Replace the archive for `key` with what `fill` writes and set its
    /// freshness marker to `updated_at`.
    ///
    /// All or nothing: if `fill` fails, the previous archive and its marker
    /// are left untouched.
    fn commit_archive(
        &self,
        key: &ArchiveKey,
        updated_at: i64,
        fill: &mut ArchiveFill<'_>,
    ) -> Result<u64, FetchError>;
}

/// `SyncStore` backed by the on-disk archive tree.
#[derive(Debug, Clone)]
pub struct FsStore {
    paths: ArchivePaths,
}

impl FsStore {
    /// Create a store over the given archive tree.
    pub fn new(paths: ArchivePaths) -> Self {
        Self { paths }
    }

    /// Return the paths used by this store.
    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }
}

impl SyncStore for FsStore {
    fn cached_branch(&self, key: &ArchiveKey) -> io::Result<Option<String>> {
        let file = match std::fs::File::open(self.paths.branch_sidecar(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut line = String::new();
        BufReader::new(file).read_line(&mut line)?;
        let branch = line.trim();
        if branch.is_empty() {
            Ok(None)
        } else {
            Ok(Some(branch.to_string()))
        }
    }

    fn save_branch(&self, key: &ArchiveKey, branch: &str) -> io::Result<()> {
        atomic_write(&self.paths.branch_sidecar(key), |f| {
            writeln!(f, "{}", branch)
        })
    }

    fn freshness_marker(&self, key: &ArchiveKey) -> io::Result<Option<i64>> {
        modified_unix(&self.paths.archive_path(key))
    }

    fn commit_archive(
        &self,
        key: &ArchiveKey,
        updated_at: i64,
        fill: &mut ArchiveFill<'_>,
    ) -> Result<u64, FetchError> {
        let dest = self.paths.archive_path(key);
        log::trace!("Writing {}", dest.display());

        // Stamped before the rename: a visible archive always has its final mtime
        atomic_write(&dest, |file| -> Result<u64, FetchError> {
            let written = {
                let mut writer = BufWriter::new(&mut *file);
                let written = fill(&mut writer)?;
                writer.flush()?;
                written
            };
            stamp_file(file, updated_at)?;
            Ok(written)
        })
    }
}
