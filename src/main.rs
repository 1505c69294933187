pub mod atomic;
pub mod branch;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod http;
pub mod paths;
pub mod progress;
pub mod staleness;
pub mod store;
pub mod sync;
pub mod types;

use std::error::Error as _;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;

use crate::config::SyncConfig;
use crate::error::RunError;
use crate::feed::FeedUpdater;
use crate::http::{HttpClient, UreqClient};
use crate::paths::ArchivePaths;
use crate::progress::{BarLogger, ProgressReporter};
use crate::store::FsStore;
use crate::sync::{LogReporter, Reporter, SyncDriver, SyncReport};

#[derive(Parser)]
#[command(
    name = "pocsync",
    about = "Mirror proof-of-concept repositories listed in the PoC-in-GitHub feed"
)]
struct Cli {
    /// Output directory for pocs
    #[arg(long, default_value = "pocs")]
    pocs_dir: PathBuf,

    /// Checkout of the metadata feed
    #[arg(long, default_value = "PoC-in-GitHub")]
    feed_dir: PathBuf,

    /// Pull (or clone) the feed before syncing
    #[arg(long)]
    update_feed: bool,

    /// Repository to clone the feed from
    #[arg(long, default_value = feed::DEFAULT_FEED_URL)]
    feed_url: String,

    /// Number of repositories fetched concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// HTTP timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Don't draw the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl From<Cli> for SyncConfig {
    fn from(cli: Cli) -> Self {
        SyncConfig {
            pocs_dir: cli.pocs_dir,
            feed_dir: cli.feed_dir,
            feed_url: cli.feed_url,
            update_feed: cli.update_feed,
            jobs: cli.jobs,
            timeout: Duration::from_secs(cli.timeout),
            progress: !cli.no_progress && std::io::stderr().is_terminal(),
        }
    }
}

fn init_logging(bar: &ProgressBar) {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info"))
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] {} - {} - {}",
                    buf.timestamp(),
                    record.target(),
                    record.level(),
                    record.args()
                )
            })
            .build();

    log::set_max_level(logger.filter());
    if let Err(e) = log::set_boxed_logger(Box::new(BarLogger::new(logger, bar.clone()))) {
        eprintln!("cannot install logger: {}", e);
    }
}

fn main() {
    let config = SyncConfig::from(Cli::parse());
    let bar = if config.progress {
        progress::new_bar("Pocs")
    } else {
        ProgressBar::hidden()
    };
    init_logging(&bar);
    log::debug!("config = {:?}", config);

    match run(&config, &bar) {
        Ok(report) => {
            log::info!(
                "Done: {} pocs, {} fetched, {} empty, {} up to date, {} failed",
                report.total(),
                report.fetched,
                report.empty,
                report.skipped,
                report.failures.len()
            );
        }
        Err(e) => {
            log::error!("{}", e);
            if log::log_enabled!(log::Level::Debug) {
                let mut source = e.source();
                while let Some(cause) = source {
                    log::error!("  caused by: {}", cause);
                    source = cause.source();
                }
            }
            std::process::exit(1);
        }
    }
}

fn run(config: &SyncConfig, bar: &ProgressBar) -> Result<SyncReport, RunError> {
    if config.update_feed {
        FeedUpdater::new(&config.feed_url).update(&config.feed_dir)?;
    }

    let http = UreqClient::new(config.timeout);
    if config.progress {
        let reporter = ProgressReporter::new(bar.clone(), LogReporter);
        run_with(config, &http, &reporter)
    } else {
        run_with(config, &http, &LogReporter)
    }
}

fn run_with(
    config: &SyncConfig,
    http: &dyn HttpClient,
    reporter: &dyn Reporter,
) -> Result<SyncReport, RunError> {
    let exploits = feed::load_all(&config.feed_dir)?;
    log::info!("Got {} pocs", exploits.len());

    atomic::ensure_dir(&config.pocs_dir).map_err(|source| RunError::OutputDir {
        path: config.pocs_dir.clone(),
        source,
    })?;
    let store = FsStore::new(ArchivePaths::new(&config.pocs_dir));

    SyncDriver::new(http, &store)
        .with_jobs(config.jobs)
        .run(&exploits, reporter)
}
