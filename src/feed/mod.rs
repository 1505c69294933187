//! Metadata feed loading.
//!
//! The feed is a directory tree of `CVE-<year>-<seq>.json` files, each holding
//! a JSON array of repository records. Hidden directories (`.git` and friends)
//! are never entered.

mod update;

pub use update::{DEFAULT_FEED_URL, FeedUpdater, UpdateError};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::types::{Exploit, Identifier, ParseError, RepositoryDescriptor};

/// Extension of record files in the feed.
pub const RECORD_EXTENSION: &str = ".json";

/// Errors returned while loading the feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// A feed file or directory could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A record file name is not a valid identifier.
    #[error("{path}: {source}")]
    MalformedIdentifier {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    /// A record file does not hold well-formed repository records.
    #[error("{path}: record {index}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        index: usize,
        reason: String,
    },
}

type EntryFilter = fn(&DirEntry) -> bool;

/// Lazy depth-first walk over the record files below a root.
///
/// Entries of each directory are visited in name order. Entries that cannot
/// be read are logged and skipped.
pub struct RecordFiles {
    walk: FilterEntry<walkdir::IntoIter, EntryFilter>,
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}

fn descend(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !is_hidden_dir(entry)
}

fn is_record(entry: &DirEntry) -> bool {
    !entry.file_type().is_dir()
        && entry
            .file_name()
            .to_string_lossy()
            .ends_with(RECORD_EXTENSION)
}

impl Iterator for RecordFiles {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.walk.next()? {
                Ok(entry) if is_record(&entry) => return Some(entry.into_path()),
                Ok(_) => {}
                Err(e) => log::warn!("Skipping unreadable feed entry: {}", e),
            }
        }
    }
}

/// Start a fresh walk for record files below `root`.
///
/// Fails only if `root` itself cannot be read.
pub fn discover(root: &Path) -> Result<RecordFiles, FeedError> {
    fs::read_dir(root).map_err(|source| FeedError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let walk = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(descend as EntryFilter);
    Ok(RecordFiles { walk })
}

/// Check that an owner login can be used as a single file name component.
fn validate_login(login: &str) -> Result<(), String> {
    if login.is_empty() {
        return Err("owner.login cannot be empty".to_string());
    }
    if login.starts_with('.') {
        return Err(format!("owner.login cannot start with '.': {:?}", login));
    }
    if login.contains('/') || login.contains('\\') {
        return Err(format!("owner.login cannot contain path separators: {:?}", login));
    }
    if login.bytes().any(|b| b < 0x20) {
        return Err(format!("owner.login cannot contain control characters: {:?}", login));
    }
    Ok(())
}

/// Parse one record file into its (identifier, descriptor) pairs.
pub fn load_file(path: &Path) -> Result<Vec<Exploit>, FeedError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let identifier: Identifier =
        file_name
            .parse()
            .map_err(|source| FeedError::MalformedIdentifier {
                path: path.to_path_buf(),
                source,
            })?;

    let contents = fs::read_to_string(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<Value> =
        serde_json::from_str(&contents).map_err(|e| FeedError::MalformedRecord {
            path: path.to_path_buf(),
            index: 0,
            reason: format!("not a JSON array of records: {}", e),
        })?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let malformed = |reason: String| FeedError::MalformedRecord {
                path: path.to_path_buf(),
                index,
                reason,
            };
            let descriptor: RepositoryDescriptor =
                serde_json::from_value(record).map_err(|e| malformed(e.to_string()))?;
            validate_login(descriptor.login()).map_err(malformed)?;
            Ok(Exploit::new(identifier, descriptor))
        })
        .collect()
}

/// Load every (identifier, descriptor) pair in the feed below `root`.
pub fn load_all(root: &Path) -> Result<Vec<Exploit>, FeedError> {
    let mut exploits = Vec::new();
    for path in discover(root)? {
        log::trace!("Loading {}", path.display());
        exploits.extend(load_file(&path)?);
    }
    Ok(exploits)
}
