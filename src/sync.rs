//! Sync driver.
//!
//! Each (identifier, repository) pair goes through the same steps: check the
//! archive's freshness marker, resolve the default branch if a download is
//! due, then fetch. An empty repository is not a failure; it gets the
//! placeholder archive, stamped like any other. Any other error only marks
//! that pair as failed.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread;

use crossbeam_channel::bounded;

use crate::branch::{BranchError, BranchResolver};
use crate::error::{RunError, SyncError};
use crate::fetch::{ArchiveFetcher, ArchiveSource};
use crate::http::HttpClient;
use crate::paths::ArchiveKey;
use crate::staleness::needs_refresh;
use crate::store::SyncStore;
use crate::types::Exploit;

/// What happened to one pair.
#[derive(Debug)]
pub enum PairStatus {
    /// A new archive was downloaded.
    Fetched { bytes: u64 },
    /// The repository has no commits; the placeholder was written.
    Empty,
    /// The archive was already current.
    Skipped,
    /// The pair failed; the archive (if any) was left untouched.
    Failed(SyncError),
}

/// Result of processing one pair.
#[derive(Debug)]
pub struct PairOutcome<'e> {
    pub exploit: &'e Exploit,
    pub status: PairStatus,
}

/// One failed pair in a [`SyncReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub identifier: String,
    pub full_name: String,
    pub message: String,
}

/// Aggregate outcome of a run.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub fetched: usize,
    pub empty: usize,
    pub skipped: usize,
    pub failures: Vec<Failure>,
}

impl SyncReport {
    /// Total number of pairs processed.
    pub fn total(&self) -> usize {
        self.fetched + self.empty + self.skipped + self.failures.len()
    }

    fn record(&mut self, outcome: &PairOutcome<'_>) {
        match &outcome.status {
            PairStatus::Fetched { .. } => self.fetched += 1,
            PairStatus::Empty => self.empty += 1,
            PairStatus::Skipped => self.skipped += 1,
            PairStatus::Failed(err) => self.failures.push(Failure {
                identifier: outcome.exploit.identifier.to_string(),
                full_name: outcome.exploit.descriptor.full_name.clone(),
                message: err.to_string(),
            }),
        }
    }
}

/// Receives progress and outcomes from the driver.
///
/// Called from worker threads when the driver runs with more than one job.
pub trait Reporter: Sync {
    /// The run is about to process `total` pairs.
    fn start(&self, _total: usize) {}

    /// One pair is done.
    fn finished(&self, outcome: &PairOutcome<'_>);

    /// The run is over.
    fn done(&self, _report: &SyncReport) {}
}

/// `Reporter` that writes outcomes to the log.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn finished(&self, outcome: &PairOutcome<'_>) {
        let exploit = outcome.exploit;
        match &outcome.status {
            PairStatus::Fetched { bytes } => {
                log::debug!("Fetched {} ({} bytes)", exploit, bytes);
            }
            PairStatus::Empty => {
                log::debug!("Repository is empty: {}", exploit.descriptor.url());
            }
            PairStatus::Skipped => log::trace!("Up to date: {}", exploit),
            PairStatus::Failed(err) => log::error!("Cannot fetch {}: {}", exploit, err),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs the per-pair state machine over a list of pairs.
pub struct SyncDriver<'a> {
    http: &'a dyn HttpClient,
    store: &'a dyn SyncStore,
    jobs: usize,
}

impl<'a> SyncDriver<'a> {
    /// Create a sequential driver.
    pub fn new(http: &'a dyn HttpClient, store: &'a dyn SyncStore) -> Self {
        Self {
            http,
            store,
            jobs: 1,
        }
    }

    /// Process pairs on up to `jobs` worker threads.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Bring one pair's archive up to date.
    ///
    /// A panic while processing the pair is caught and reported as that
    /// pair's failure.
    pub fn sync_one(&self, exploit: &Exploit) -> PairStatus {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_sync_one(exploit))) {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => PairStatus::Failed(err),
            Err(payload) => {
                PairStatus::Failed(SyncError::Panicked(panic_message(&*payload)))
            }
        }
    }

    fn try_sync_one(&self, exploit: &Exploit) -> Result<PairStatus, SyncError> {
        let key = ArchiveKey::from(exploit);
        let updated_at = exploit.descriptor.updated_at_unix();

        let marker = match self.store.freshness_marker(&key) {
            Ok(marker) => marker,
            Err(e) => {
                log::debug!("Cannot read freshness of {}: {}; refreshing", key, e);
                None
            }
        };
        if !needs_refresh(marker, updated_at) {
            return Ok(PairStatus::Skipped);
        }

        let resolver = BranchResolver::new(self.http, self.store);
        let branch = match resolver.resolve(exploit) {
            Ok(branch) => Some(branch),
            Err(BranchError::EmptyRepository { .. }) => None,
            Err(e) => return Err(SyncError::BranchResolution(e)),
        };

        let fetcher = ArchiveFetcher::new(self.http, self.store);
        match branch {
            Some(branch) => {
                let source = ArchiveSource::Branch(&branch);
                let bytes = fetcher.fetch(&key, &exploit.descriptor, source)?;
                Ok(PairStatus::Fetched { bytes })
            }
            None => {
                fetcher.fetch(&key, &exploit.descriptor, ArchiveSource::Empty)?;
                Ok(PairStatus::Empty)
            }
        }
    }

    /// Process every pair, reporting each outcome, and summarize the run.
    ///
    /// Per-pair failures end up in the report. Only a crashed worker makes the
    /// whole run fail.
    pub fn run(
        &self,
        exploits: &[Exploit],
        reporter: &dyn Reporter,
    ) -> Result<SyncReport, RunError> {
        reporter.start(exploits.len());
        let report = Mutex::new(SyncReport::default());

        let handle = |exploit: &Exploit| {
            let outcome = PairOutcome {
                exploit,
                status: self.sync_one(exploit),
            };
            reporter.finished(&outcome);
            if let Ok(mut report) = report.lock() {
                report.record(&outcome);
            }
        };

        if self.jobs == 1 {
            exploits.iter().for_each(handle);
        } else {
            self.run_pool(exploits, &handle)?;
        }

        let report = report
            .into_inner()
            .map_err(|_| RunError::Fatal("sync report lock poisoned".to_string()))?;
        reporter.done(&report);
        Ok(report)
    }

    fn run_pool<F>(&self, exploits: &[Exploit], handle: &F) -> Result<(), RunError>
    where
        F: Fn(&Exploit) + Sync,
    {
        // Pairs sharing an archive slot stay on one worker, in feed order.
        let mut batches: Vec<Vec<&Exploit>> = Vec::new();
        let mut slots: std::collections::HashMap<ArchiveKey, usize> =
            std::collections::HashMap::new();
        for exploit in exploits {
            let idx = *slots.entry(ArchiveKey::from(exploit)).or_insert_with(|| {
                batches.push(Vec::new());
                batches.len() - 1
            });
            batches[idx].push(exploit);
        }

        let (sender, receiver) = bounded::<Vec<&Exploit>>(self.jobs);

        thread::scope(|scope| {
            let workers: Vec<_> = (0..self.jobs)
                .map(|_| {
                    let receiver = receiver.clone();
                    scope.spawn(move || {
                        for batch in receiver.iter() {
                            batch.into_iter().for_each(handle);
                        }
                    })
                })
                .collect();
            drop(receiver);

            for batch in batches {
                if sender.send(batch).is_err() {
                    // Every worker is gone
                    break;
                }
            }
            drop(sender);

            let mut crashed = 0;
            for worker in workers {
                if worker.join().is_err() {
                    crashed += 1;
                }
            }
            if crashed > 0 {
                return Err(RunError::Fatal(format!("{} sync worker(s) panicked", crashed)));
            }
            Ok(())
        })
    }
}
