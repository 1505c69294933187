//! Terminal progress line for the fetch loop.

use indicatif::{ProgressBar, ProgressStyle};
use log::{Log, Metadata, Record};

use crate::sync::{PairOutcome, Reporter, SyncReport};

const TEMPLATE: &str = "{prefix} {bar:32} {percent}% ({pos})";

/// Build the stderr bar for the fetch loop: `Pocs ████∙∙∙∙ 42% (123)`.
pub fn new_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    match ProgressStyle::with_template(TEMPLATE) {
        Ok(style) => bar.set_style(style.progress_chars("█∙")),
        Err(e) => log::debug!("Falling back to default progress style: {}", e),
    }
    bar.set_prefix(label.to_string());
    bar
}

/// `Reporter` that advances a progress bar and forwards every event to an
/// inner reporter.
pub struct ProgressReporter<R> {
    bar: ProgressBar,
    inner: R,
}

impl<R: Reporter> ProgressReporter<R> {
    /// Drive `bar`, forwarding events to `inner`.
    pub fn new(bar: ProgressBar, inner: R) -> Self {
        Self { bar, inner }
    }
}

impl<R: Reporter> Reporter for ProgressReporter<R> {
    fn start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.inner.start(total);
    }

    fn finished(&self, outcome: &PairOutcome<'_>) {
        self.inner.finished(outcome);
        self.bar.inc(1);
    }

    fn done(&self, report: &SyncReport) {
        self.bar.finish();
        self.inner.done(report);
    }
}

/// `log::Log` wrapper that hides the bar while a record is written, so log
/// lines land above the bar rather than on it.
pub struct BarLogger<L> {
    inner: L,
    bar: ProgressBar,
}

impl<L: Log> BarLogger<L> {
    /// Write through `inner`, suspending `bar` around each record.
    pub fn new(inner: L, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

impl<L: Log> Log for BarLogger<L> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if self.inner.enabled(record.metadata()) {
            self.bar.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::PairStatus;
    use crate::types::fixtures::exploit;
    use log::Level;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Count(AtomicUsize);

    impl Reporter for Count {
        fn finished(&self, _outcome: &PairOutcome<'_>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Keeps the messages of records at `Info` or above.
    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= Level::Info
        }

        fn log(&self, record: &Record<'_>) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    #[test]
    fn template_is_valid() {
        assert!(ProgressStyle::with_template(TEMPLATE).is_ok());
    }

    #[test]
    fn new_bar_is_labelled() {
        let bar = new_bar("Pocs");
        assert_eq!(bar.prefix(), "Pocs");
    }

    #[test]
    fn reporter_advances_bar_and_forwards() {
        let reporter = ProgressReporter::new(ProgressBar::hidden(), Count::default());
        let e = exploit("CVE-2021-0001", "a", "one", "2021-07-01T12:00:00Z");

        reporter.start(3);
        for _ in 0..2 {
            reporter.finished(&PairOutcome {
                exploit: &e,
                status: PairStatus::Skipped,
            });
        }

        assert_eq!(reporter.bar.length(), Some(3));
        assert_eq!(reporter.bar.position(), 2);
        assert_eq!(reporter.inner.0.load(Ordering::SeqCst), 2);

        reporter.done(&SyncReport::default());
        assert!(reporter.bar.is_finished());
    }

    #[test]
    fn bar_logger_forwards_enabled_records_only() {
        let logger = BarLogger::new(Capture::default(), ProgressBar::hidden());

        logger.log(
            &Record::builder()
                .args(format_args!("Got 3 pocs"))
                .level(Level::Info)
                .target("pocsync")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("Downloading"))
                .level(Level::Debug)
                .target("pocsync::fetch")
                .build(),
        );

        assert_eq!(*logger.inner.0.lock().unwrap(), ["Got 3 pocs"]);
    }
}
