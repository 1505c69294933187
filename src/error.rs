//! Error kinds seen by the sync driver and the binary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::branch::BranchError;
use crate::feed::{FeedError, UpdateError};
use crate::fetch::FetchError;
use crate::http::HttpError;

/// Why one (identifier, repository) pair failed. Never aborts the batch.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Neither a branch nor an empty-repository marker could be found.
    #[error("branch resolution failed: {0}")]
    BranchResolution(BranchError),
    /// The archive download failed.
    #[error("transfer failed: {0}")]
    Transfer(#[from] HttpError),
    /// Local filesystem failure while materializing the archive.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// Processing the pair panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

impl From<FetchError> for SyncError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transfer(e) => SyncError::Transfer(e),
            FetchError::Io(e) => SyncError::Io(e),
        }
    }
}

/// Failures that abort the whole run.
#[derive(Error, Debug)]
pub enum RunError {
    /// The feed is missing or corrupt.
    #[error("cannot load feed: {0}")]
    Feed(#[from] FeedError),
    /// Updating the feed checkout failed.
    #[error("cannot update feed: {0}")]
    FeedUpdate(#[from] UpdateError),
    /// The archive root cannot be created.
    #[error("cannot use output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Anything else.
    #[error("{0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_keep_their_kind() {
        let transfer: SyncError = FetchError::Transfer(HttpError::Status {
            url: "u".to_string(),
            code: 503,
        })
        .into();
        assert!(matches!(transfer, SyncError::Transfer(_)));

        let io: SyncError = FetchError::Io(io::Error::other("disk full")).into();
        assert!(matches!(io, SyncError::Io(_)));
    }

    #[test]
    fn branch_failure_message_names_url() {
        let err = SyncError::BranchResolution(BranchError::Unresolved {
            url: "https://github.com/acme/x".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "branch resolution failed: cannot get branch name from github for https://github.com/acme/x"
        );
    }
}
