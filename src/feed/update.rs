//! Feed checkout maintenance through the git CLI.

use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

/// Upstream repository the feed is cloned from by default.
pub const DEFAULT_FEED_URL: &str = "https://github.com/nomi-sec/PoC-in-GitHub";

/// Errors returned by feed updates.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// git could not be started.
    #[error("cannot run git: {0}")]
    Io(#[from] std::io::Error),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Pull failed.
    #[error("pull failed: {0}")]
    PullError(String),
}

/// Git CLI wrapper that keeps the feed checkout current.
pub struct FeedUpdater {
    git_path: String,
    url: String,
}

impl FeedUpdater {
    /// Create an updater that clones from `url` when no checkout exists.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            git_path: "git".into(),
            url: url.into(),
        }
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.args(["-c", "core.hooksPath="]);
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Pull `checkout` if it exists, otherwise clone the feed into it.
    pub fn update(&self, checkout: &Path) -> Result<(), UpdateError> {
        if checkout.join(".git").exists() {
            log::info!("Updating feed in {}", checkout.display());
            let output = self
                .command()
                .arg("-C")
                .arg(checkout)
                .args(["pull", "--ff-only", "--quiet"])
                .output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(UpdateError::PullError(stderr.trim().to_string()));
            }
        } else {
            log::info!("Cloning {} into {}", self.url, checkout.display());
            if let Some(parent) = checkout.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let output = self
                .command()
                .args(["clone", "--quiet"])
                .arg(&self.url)
                .arg(checkout)
                .output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(UpdateError::CloneError(stderr.trim().to_string()));
            }
        }
        Ok(())
    }
}
