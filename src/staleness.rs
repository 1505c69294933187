//! Freshness checking for cached archives.
//!
//! The archive's own modification time is the freshness marker: after a
//! successful sync it is stamped with the repository's `updated_at`, so an
//! archive is stale exactly when the feed reports a later update.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use filetime::FileTime;

/// Read a file's modification time in whole seconds since the Unix epoch.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn modified_unix(path: &Path) -> io::Result<Option<i64>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(
            FileTime::from_last_modification_time(&metadata).unix_seconds(),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decide whether a cached archive must be downloaded again.
///
/// Returns true if:
/// - There is no marker (no archive yet)
/// - The marker is strictly older than `updated_at`
///
/// Equal timestamps are fresh.
pub fn needs_refresh(marker: Option<i64>, updated_at: i64) -> bool {
    match marker {
        None => true,
        Some(mtime) => mtime < updated_at,
    }
}

/// Set both access and modification time of `path` to `unix_seconds`.
#[cfg(test)]
pub fn stamp(path: &Path, unix_seconds: i64) -> io::Result<()> {
    let ft = FileTime::from_unix_time(unix_seconds, 0);
    filetime::set_file_times(path, ft, ft)
}

/// Set both access and modification time through an open handle. Must follow
/// the last write.
pub fn stamp_file(file: &File, unix_seconds: i64) -> io::Result<()> {
    let ft = FileTime::from_unix_time(unix_seconds, 0);
    filetime::set_file_handle_times(file, Some(ft), Some(ft))
}
