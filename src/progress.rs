use std::path::PathBuf;
use std::sync::Arc;

use crate::episode::{AssetKind, EpisodeStatus};
use crate::stats::RunSummary;

/// Events emitted during an archive run for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The listing for a year is being fetched
    FetchingListing { year: i32 },

    /// The listing for a year yielded episodes
    ListingReady {
        year: i32,
        listed: usize,
        to_reconcile: usize,
    },

    /// The listing for a year could not be used
    ListingFailed { year: i32, error: String },

    /// The index file was unreadable and the run starts from an empty table
    IndexRecovered {
        path: PathBuf,
        error: String,
        /// Where the unreadable file was moved, if that succeeded
        backup: Option<PathBuf>,
    },

    /// Leftover temporary files were removed from the show directory
    PartialFilesCleanedUp { count: usize },

    /// An asset download is starting
    AssetStarting {
        /// Identifies the worker slot (0 to max_concurrent-1)
        slot: usize,
        episode_title: String,
        kind: AssetKind,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Asset download progress update
    AssetProgress {
        slot: usize,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An asset was written to its final path
    AssetDownloaded {
        slot: usize,
        episode_title: String,
        kind: AssetKind,
        bytes: u64,
    },

    /// An asset failed to download
    AssetFailed {
        slot: usize,
        episode_title: String,
        kind: AssetKind,
        error: String,
    },

    /// An episode was reconciled and upserted into the index
    EpisodeReconciled {
        episode_title: String,
        year: i32,
        status: EpisodeStatus,
    },

    /// The index was written to disk
    IndexFlushed { rows: usize },

    /// The run finished
    RunCompleted { summary: RunSummary },
}

/// Trait for reporting progress events during a run.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Reporter that keeps every event for later inspection
    #[derive(Default)]
    pub(crate) struct RecordingReporter {
        pub events: Mutex<Vec<ProgressEvent>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[test]
    fn noop_reporter_handles_events() {
        let reporter = NoopReporter::shared();
        reporter.report(ProgressEvent::FetchingListing { year: 2024 });
        reporter.report(ProgressEvent::AssetFailed {
            slot: 0,
            episode_title: "Episode".to_string(),
            kind: AssetKind::Mp3,
            error: "Connection timeout".to_string(),
        });
        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: 2 });
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::default();
        reporter.report(ProgressEvent::FetchingListing { year: 2023 });
        reporter.report(ProgressEvent::IndexFlushed { rows: 3 });

        let events = reporter.events.lock().unwrap();
        assert!(matches!(events[0], ProgressEvent::FetchingListing { year: 2023 }));
        assert!(matches!(events[1], ProgressEvent::IndexFlushed { rows: 3 }));
    }
}
