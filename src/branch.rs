//! Default branch resolution.
//!
//! Branch names come from the per-owner sidecar when one exists. Otherwise the
//! repository's landing page is fetched and the branch is read from its
//! `/<owner>/<repo>/commits/<branch>` link, which works without API access.
//! Cached names are never re-validated: a renamed default branch keeps being
//! used until the sidecar is deleted.

use regex::Regex;
use thiserror::Error;

use crate::http::{HttpClient, HttpError};
use crate::paths::ArchiveKey;
use crate::store::SyncStore;
use crate::types::Exploit;

/// Text GitHub shows on the landing page of a repository without commits.
pub const EMPTY_REPOSITORY_MARKER: &str = "This repository is empty.";

/// Errors returned by branch resolution.
#[derive(Error, Debug)]
pub enum BranchError {
    /// The repository has no commits, so there is no branch to archive.
    #[error("repository is empty: {url}")]
    EmptyRepository { owner: String, url: String },
    /// The landing page had neither a commits link nor the empty marker.
    #[error("cannot get branch name from github for {url}")]
    Unresolved { url: String },
    /// The scraped branch name is unsafe to use in a URL or file.
    #[error("refusing branch name {branch:?} from {url}: {reason}")]
    InvalidBranch {
        url: String,
        branch: String,
        reason: String,
    },
    /// Fetching the landing page failed.
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Validate that a scraped branch name does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-`
/// - Strings containing null bytes or control characters
fn validate_branch(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("branch cannot be empty".to_string());
    }
    if value.contains("..") {
        return Err("branch cannot contain '..'".to_string());
    }
    if value.starts_with('-') {
        return Err("branch cannot start with '-'".to_string());
    }
    if value.bytes().any(|b| b < 0x20 || b == 0x7f) {
        return Err("branch cannot contain null or control characters".to_string());
    }
    Ok(())
}

/// Find the default branch in a repository landing page.
///
/// The first `href="/<owner>/<name>/commits/<branch>"` link wins; owner and
/// name must match exactly.
pub fn scrape_default_branch(html: &str, owner: &str, name: &str) -> Option<String> {
    let pattern = format!(
        r#"\bhref="/{}/{}/commits/(?P<branch>[^/"]+)""#,
        regex::escape(owner),
        regex::escape(name)
    );
    // Owner and name are escaped, so the pattern always compiles
    let re = Regex::new(&pattern);
    debug_assert!(re.is_ok(), "commits-link pattern must compile: {}", pattern);
    re.ok()?
        .captures(html)
        .map(|caps| caps["branch"].to_string())
}

/// Resolves default branches, memoizing them in the store.
pub struct BranchResolver<'a> {
    http: &'a dyn HttpClient,
    store: &'a dyn SyncStore,
}

impl<'a> BranchResolver<'a> {
    /// Create a resolver over the given HTTP client and store.
    pub fn new(http: &'a dyn HttpClient, store: &'a dyn SyncStore) -> Self {
        Self { http, store }
    }

    /// Return the branch to archive for `exploit`.
    ///
    /// Returns `BranchError::EmptyRepository` when the repository has no
    /// commits; callers treat that as a signal rather than a failure.
    pub fn resolve(&self, exploit: &Exploit) -> Result<String, BranchError> {
        let key = ArchiveKey::from(exploit);

        match self.store.cached_branch(&key) {
            Ok(Some(branch)) => {
                log::trace!("Using cached branch {} for {}", branch, key);
                return Ok(branch);
            }
            Ok(None) => {}
            Err(e) => log::warn!("Cannot read cached branch for {}: {}", key, e),
        }

        let branch = self.resolve_from_github(exploit)?;

        if let Err(e) = self.store.save_branch(&key, &branch) {
            log::warn!("Cannot cache branch {} for {}: {}", branch, key, e);
        }

        Ok(branch)
    }

    fn resolve_from_github(&self, exploit: &Exploit) -> Result<String, BranchError> {
        let descriptor = &exploit.descriptor;
        let url = descriptor.url();
        let html = self.http.get_text(url)?;

        match scrape_default_branch(&html, descriptor.login(), &descriptor.name) {
            Some(branch) => {
                validate_branch(&branch).map_err(|reason| BranchError::InvalidBranch {
                    url: url.to_string(),
                    branch: branch.clone(),
                    reason,
                })?;
                log::debug!("Resolved default branch {} for {}", branch, url);
                Ok(branch)
            }
            None if html.contains(EMPTY_REPOSITORY_MARKER) => Err(BranchError::EmptyRepository {
                owner: descriptor.login().to_string(),
                url: url.to_string(),
            }),
            None => Err(BranchError::Unresolved {
                url: url.to_string(),
            }),
        }
    }
}
