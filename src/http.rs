//! Blocking HTTP access to the forge.

use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;

/// Default per-request timeout for connect and read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const USER_AGENT: &str = concat!("pocsync/", env!("CARGO_PKG_VERSION"));

/// Errors returned by HTTP operations.
#[derive(Error, Debug)]
pub enum HttpError {
    /// The server answered with a non-success status.
    #[error("{url}: HTTP {code}")]
    Status { url: String, code: u16 },
    /// Connection, TLS or protocol failure.
    #[error("{url}: transport error: {message}")]
    Transport { url: String, message: String },
    /// Reading the body or writing it out failed.
    #[error("{url}: {source}")]
    Io {
        url: String,
        #[source]
        source: io::Error,
    },
}

/// The HTTP capability the sync engine needs.
pub trait HttpClient: Send + Sync {
    /// GET `url` and return the body as text.
    fn get_text(&self, url: &str) -> Result<String, HttpError>;

    /// GET `url` and stream the body into `sink`, returning the byte count.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HttpError>;
}

/// `HttpClient` backed by a shared `ureq` agent.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl UreqClient {
    /// Create a client whose connect and read operations time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::builder()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self { agent }
    }

    fn call(&self, url: &str) -> Result<ureq::Response, HttpError> {
        match self.agent.get(url).call() {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, _)) => Err(HttpError::Status {
                url: url.to_string(),
                code,
            }),
            Err(ureq::Error::Transport(e)) => Err(HttpError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}

impl HttpClient for UreqClient {
    fn get_text(&self, url: &str) -> Result<String, HttpError> {
        log::trace!("GET {}", url);
        self.call(url)?
            .into_string()
            .map_err(|source| HttpError::Io {
                url: url.to_string(),
                source,
            })
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HttpError> {
        log::trace!("GET {} (stream)", url);
        let mut reader = self.call(url)?.into_reader();
        io::copy(&mut reader, sink).map_err(|source| HttpError::Io {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, HashSet};
    use std::io::{self, Write};
    use std::sync::Mutex;

    use super::{HttpClient, HttpError};

    /// Canned responses keyed by URL, with a record of every request.
    #[derive(Default)]
    pub struct FakeHttp {
        pages: HashMap<String, String>,
        archives: HashMap<String, Vec<u8>>,
        failures: HashMap<String, u16>,
        resets: HashSet<String>,
        panics: HashSet<String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeHttp {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub fn archive(mut self, url: &str, body: &[u8]) -> Self {
            self.archives.insert(url.to_string(), body.to_vec());
            self
        }

        pub fn fail(mut self, url: &str, code: u16) -> Self {
            self.failures.insert(url.to_string(), code);
            self
        }

        /// Stream part of the body for `url`, then drop the connection.
        pub fn reset(mut self, url: &str, partial: &[u8]) -> Self {
            self.archives.insert(url.to_string(), partial.to_vec());
            self.resets.insert(url.to_string());
            self
        }

        /// Panic when `url` is requested.
        pub fn panic_on(mut self, url: &str) -> Self {
            self.panics.insert(url.to_string());
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests_for(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.as_str() == url)
                .count()
        }

        fn record(&self, url: &str) -> Result<(), HttpError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.panics.contains(url) {
                panic!("simulated crash fetching {}", url);
            }
            match self.failures.get(url) {
                Some(&code) => Err(HttpError::Status {
                    url: url.to_string(),
                    code,
                }),
                None => Ok(()),
            }
        }
    }

    impl HttpClient for FakeHttp {
        fn get_text(&self, url: &str) -> Result<String, HttpError> {
            self.record(url)?;
            self.pages.get(url).cloned().ok_or(HttpError::Status {
                url: url.to_string(),
                code: 404,
            })
        }

        fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HttpError> {
            self.record(url)?;
            let body = self.archives.get(url).ok_or(HttpError::Status {
                url: url.to_string(),
                code: 404,
            })?;
            if self.resets.contains(url) {
                let _ = sink.write_all(body);
                return Err(HttpError::Io {
                    url: url.to_string(),
                    source: io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
                });
            }
            sink.write_all(body).map_err(|source| HttpError::Io {
                url: url.to_string(),
                source,
            })?;
            Ok(body.len() as u64)
        }
    }

    pub fn landing_page(owner: &str, name: &str, branch: &str) -> String {
        format!(
            r#"<html><a class="Link" href="/{owner}/{name}/commits/{branch}">commits</a></html>"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Network tests - only run with POCSYNC_RUN_NETWORK_TESTS=1
    fn network_tests_enabled() -> bool {
        match std::env::var("POCSYNC_RUN_NETWORK_TESTS") {
            Ok(value) => {
                let value = value.to_ascii_lowercase();
                value == "1" || value == "true" || value == "yes"
            }
            Err(_) => false,
        }
    }

    #[test]
    fn status_error_names_url_and_code() {
        let err = HttpError::Status {
            url: "https://github.com/acme/gone".to_string(),
            code: 404,
        };
        assert_eq!(err.to_string(), "https://github.com/acme/gone: HTTP 404");
    }

    #[test]
    fn get_text_fetches_real_page() {
        if !network_tests_enabled() {
            eprintln!("skipping network test (set POCSYNC_RUN_NETWORK_TESTS=1)");
            return;
        }

        let client = UreqClient::default();
        let body = client.get_text("https://github.com/octocat/Hello-World").unwrap();
        assert!(body.contains("Hello-World"));
    }

    #[test]
    fn missing_repo_is_status_error() {
        if !network_tests_enabled() {
            eprintln!("skipping network test (set POCSYNC_RUN_NETWORK_TESTS=1)");
            return;
        }

        let client = UreqClient::default();
        match client.get_text("https://github.com/octocat/this-repo-definitely-does-not-exist-12345") {
            Err(HttpError::Status { code: 404, .. }) => {}
            other => panic!("Expected 404, got {:?}", other.map(|s| s.len())),
        }
    }
}
