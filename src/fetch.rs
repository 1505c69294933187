//! Archive download and materialization.

use std::io::{self, Write};

use thiserror::Error;

use crate::http::{HttpClient, HttpError};
use crate::paths::ArchiveKey;
use crate::store::SyncStore;
use crate::types::RepositoryDescriptor;

/// Written in place of an archive when the repository has no commits.
pub const EMPTY_PLACEHOLDER: &[u8] = b"Empty repository";

/// Errors returned by archive fetches.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Downloading the archive failed.
    #[error("transfer failed: {0}")]
    Transfer(#[from] HttpError),
    /// Writing or stamping the archive failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// What to put at the archive location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSource<'b> {
    /// The zip of this branch.
    Branch(&'b str),
    /// The placeholder for a repository without commits.
    Empty,
}

/// Returns the zip URL for `branch`: `{html_url}/archive/refs/heads/{branch}.zip`
pub fn archive_url(descriptor: &RepositoryDescriptor, branch: &str) -> String {
    format!("{}/archive/refs/heads/{}.zip", descriptor.url(), branch)
}

/// Downloads archives into a store, stamped with the repository's update time.
pub struct ArchiveFetcher<'a> {
    http: &'a dyn HttpClient,
    store: &'a dyn SyncStore,
}

impl<'a> ArchiveFetcher<'a> {
    /// Create a fetcher over the given HTTP client and store.
    pub fn new(http: &'a dyn HttpClient, store: &'a dyn SyncStore) -> Self {
        Self { http, store }
    }

    /// Materialize `source` as the archive for `key`, returning the number of
    /// bytes written.
    ///
    /// The store only installs the archive once the payload is complete, so a
    /// failed transfer leaves any previous archive (and its mtime) as is.
    pub fn fetch(
        &self,
        key: &ArchiveKey,
        descriptor: &RepositoryDescriptor,
        source: ArchiveSource<'_>,
    ) -> Result<u64, FetchError> {
        let updated_at = descriptor.updated_at_unix();

        match source {
            ArchiveSource::Branch(branch) => {
                let url = archive_url(descriptor, branch);
                log::debug!("Downloading {} for {}", url, key);
                self.store.commit_archive(key, updated_at, &mut |sink| {
                    Ok(self.http.download(&url, sink)?)
                })
            }
            ArchiveSource::Empty => self.store.commit_archive(key, updated_at, &mut |sink| {
                sink.write_all(EMPTY_PLACEHOLDER)?;
                Ok(EMPTY_PLACEHOLDER.len() as u64)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::FakeHttp;
    use crate::paths::ArchivePaths;
    use crate::staleness::modified_unix;
    use crate::store::FsStore;
    use crate::store::testing::MemoryStore;
    use crate::types::fixtures::descriptor;
    use tempfile::tempdir;

    const ZIP_URL: &str = "https://github.com/acme/rpc-leak/archive/refs/heads/main.zip";
    const T: i64 = 1_625_140_800;

    fn sample() -> RepositoryDescriptor {
        descriptor("acme", "rpc-leak", "2021-07-01T12:00:00Z")
    }

    fn key() -> ArchiveKey {
        ArchiveKey::new("CVE-2021-34527".parse().unwrap(), "acme")
    }

    #[test]
    fn archive_url_uses_branch_ref() {
        assert_eq!(archive_url(&sample(), "main"), ZIP_URL);
    }

    #[test]
    fn fetch_writes_body_and_stamps_mtime() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(ArchivePaths::new(dir.path()));
        let http = FakeHttp::new().archive(ZIP_URL, b"PK\x03\x04zip-bytes");
        let fetcher = ArchiveFetcher::new(&http, &store);

        let written = fetcher
            .fetch(&key(), &sample(), ArchiveSource::Branch("main"))
            .unwrap();

        let dest = dir.path().join("2021").join("CVE-2021-34527").join("acme.zip");
        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"PK\x03\x04zip-bytes");
        assert_eq!(modified_unix(&dest).unwrap(), Some(T));
    }

    #[test]
    fn fetch_overwrites_previous_archive() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(ArchivePaths::new(dir.path()));
        let dest = store.paths().archive_path(&key());
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"an older and longer archive body").unwrap();
        let http = FakeHttp::new().archive(ZIP_URL, b"new");
        let fetcher = ArchiveFetcher::new(&http, &store);

        fetcher
            .fetch(&key(), &sample(), ArchiveSource::Branch("main"))
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn empty_source_writes_placeholder_without_request() {
        let store = MemoryStore::default();
        let http = FakeHttp::new();
        let fetcher = ArchiveFetcher::new(&http, &store);

        fetcher.fetch(&key(), &sample(), ArchiveSource::Empty).unwrap();

        assert_eq!(
            store.archive(&key()),
            Some((b"Empty repository".to_vec(), T))
        );
        assert_eq!(http.request_count(), 0);
    }

    #[test]
    fn interrupted_transfer_keeps_previous_archive() {
        let dir = tempdir().unwrap();
        let store = FsStore::new(ArchivePaths::new(dir.path()));
        let dest = store.paths().archive_path(&key());
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"previous").unwrap();
        let before = modified_unix(&dest).unwrap();
        let http = FakeHttp::new().reset(ZIP_URL, b"PK\x03");
        let fetcher = ArchiveFetcher::new(&http, &store);

        let result = fetcher.fetch(&key(), &sample(), ArchiveSource::Branch("main"));

        assert!(matches!(result, Err(FetchError::Transfer(HttpError::Io { .. }))));
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous");
        assert_eq!(modified_unix(&dest).unwrap(), before);
    }

    #[test]
    fn failed_first_transfer_creates_nothing() {
        let store = MemoryStore::default();
        let http = FakeHttp::new().fail(ZIP_URL, 502);
        let fetcher = ArchiveFetcher::new(&http, &store);

        let result = fetcher.fetch(&key(), &sample(), ArchiveSource::Branch("main"));

        assert!(matches!(
            result,
            Err(FetchError::Transfer(HttpError::Status { code: 502, .. }))
        ));
        assert_eq!(store.archive(&key()), None);
    }
}
