//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::feed::DEFAULT_FEED_URL;
use crate::http::DEFAULT_TIMEOUT;

/// Everything a sync run needs to know, independent of how it was parsed.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the archive tree.
    pub pocs_dir: PathBuf,
    /// Checkout of the metadata feed.
    pub feed_dir: PathBuf,
    /// Where to clone the feed from when `update_feed` finds no checkout.
    pub feed_url: String,
    /// Pull (or clone) the feed before loading it.
    pub update_feed: bool,
    /// Number of pairs processed concurrently.
    pub jobs: usize,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Draw the progress line.
    pub progress: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pocs_dir: PathBuf::from("pocs"),
            feed_dir: PathBuf::from("PoC-in-GitHub"),
            feed_url: DEFAULT_FEED_URL.to_string(),
            update_feed: false,
            jobs: 1,
            timeout: DEFAULT_TIMEOUT,
            progress: true,
        }
    }
}
