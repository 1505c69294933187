//! Shared types for pocsync

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix shared by every identifier in the feed.
pub const IDENTIFIER_PREFIX: &str = "CVE";

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"^{}-(?P<year>\d+)-(?P<id>\d+)",
        regex::escape(IDENTIFIER_PREFIX)
    );
    Regex::new(&pattern).expect("identifier pattern is valid")
});

/// Error type for parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad format for CVE: {0:?}")]
    MalformedIdentifier(String),
}

/// A vulnerability identifier such as `CVE-2021-34527`.
///
/// Parsing searches for `CVE-<digits>-<digits>` at the start of the input and
/// tolerates trailing content, so a feed filename like `CVE-2021-34527.json`
/// parses directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    year: u32,
    sequence: u64,
}

impl Identifier {
    /// Creates a new Identifier from its year and sequence number
    pub fn new(year: u32, sequence: u64) -> Self {
        Self { year, sequence }
    }

    /// Returns the year component
    pub fn year(&self) -> u32 {
        self.year
    }

    /// Returns the sequence number component
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl FromStr for Identifier {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseError::MalformedIdentifier(s.to_string());
        let caps = IDENTIFIER_RE.captures(s).ok_or_else(malformed)?;
        let year = caps["year"].parse::<u32>().map_err(|_| malformed())?;
        let sequence = caps["id"].parse::<u64>().map_err(|_| malformed())?;
        Ok(Identifier { year, sequence })
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:04}", IDENTIFIER_PREFIX, self.year, self.sequence)
    }
}

/// The account owning a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One repository record from the feed.
///
/// Only the fields the sync engine needs are typed; everything else in the
/// record is kept in `extra` untouched.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryDescriptor {
    pub full_name: String,
    pub owner: Account,
    pub name: String,
    pub html_url: String,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepositoryDescriptor {
    /// Returns the owning account's handle
    pub fn login(&self) -> &str {
        &self.owner.login
    }

    /// Returns the repository web URL without a trailing slash
    pub fn url(&self) -> &str {
        self.html_url.trim_end_matches('/')
    }

    /// Returns the last update time as seconds since the Unix epoch (UTC)
    pub fn updated_at_unix(&self) -> i64 {
        self.updated_at.timestamp()
    }
}

/// A repository descriptor paired with the identifier it was listed under.
#[derive(Debug, Clone)]
pub struct Exploit {
    pub identifier: Identifier,
    pub descriptor: RepositoryDescriptor,
}

impl Exploit {
    /// Creates a new Exploit
    pub fn new(identifier: Identifier, descriptor: RepositoryDescriptor) -> Self {
        Self {
            identifier,
            descriptor,
        }
    }
}

impl fmt::Display for Exploit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.descriptor.full_name)
    }
}
