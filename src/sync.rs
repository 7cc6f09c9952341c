// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinError;

use crate::episode::{ArchiveLayout, EpisodeId, EpisodeRecord, EpisodeStatus};
use crate::error::{IndexError, RunError};
use crate::http::{HttpClient, READ_TIMEOUT};
use crate::index::IndexStore;
use crate::listing::{ListedEpisode, ListingSource};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::reconcile::EpisodeReconciler;
use crate::state::{prepare_show_dir, sweep_partial_files};
use crate::stats::{RunEvent, RunStats, RunSummary};

/// Show archived when none is given
pub const DEFAULT_SHOW: &str = "6 Minute English";

/// Options for an archive run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Archive root; each show gets a directory below it
    pub root: PathBuf,
    /// Show name, used for the directory, the index file and identities
    pub show: String,
    /// Maximum number of episodes reconciled at the same time
    pub max_concurrent: usize,
    /// Re-download assets that are already present
    pub force: bool,
    /// Flush the index after this many upserts (0 = only at the end)
    pub flush_every: usize,
    /// Abandon an asset transfer that delivers nothing for this long
    pub idle_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            show: DEFAULT_SHOW.to_string(),
            max_concurrent: 3,
            force: false,
            flush_every: 10,
            idle_timeout: READ_TIMEOUT,
        }
    }
}

/// Result of reconciling one episode on a worker
struct Reconciled {
    record: EpisodeRecord,
    stats: RunStats,
}

/// State owned by the coordinating task. All index mutations go through it.
struct Coordinator {
    store: IndexStore,
    stats: RunStats,
    unflushed: usize,
    flush_every: usize,
    reporter: SharedProgressReporter,
}

impl Coordinator {
    fn new(store: IndexStore, flush_every: usize, reporter: SharedProgressReporter) -> Self {
        Self {
            store,
            stats: RunStats::new(),
            unflushed: 0,
            flush_every,
            reporter,
        }
    }

    /// Take in the outcome of one episode, in listing order
    fn absorb(&mut self, episode: &ListedEpisode, joined: Result<Reconciled, JoinError>) {
        let done = match joined {
            Ok(done) => done,
            Err(err) => {
                // The previous row, if any, stays as it was
                tracing::error!(title = %episode.title, error = %err, "reconciliation task did not complete");
                self.stats.record(RunEvent::EpisodeAborted);
                self.reporter.report(ProgressEvent::EpisodeReconciled {
                    episode_title: episode.title.clone(),
                    year: episode.release_year,
                    status: EpisodeStatus::Failed,
                });
                return;
            }
        };

        self.stats.merge(&done.stats);

        self.reporter.report(ProgressEvent::EpisodeReconciled {
            episode_title: done.record.title.clone(),
            year: done.record.release_year,
            status: done.record.status,
        });
        self.store.upsert(done.record);
        self.unflushed += 1;

        if self.flush_every > 0 && self.unflushed >= self.flush_every {
            // A failed periodic flush is retried by the next one
            if let Err(err) = self.flush() {
                tracing::warn!(error = %err, "periodic index flush failed");
            }
        }
    }

    fn flush(&mut self) -> Result<(), IndexError> {
        self.store.flush()?;
        self.unflushed = 0;
        self.reporter.report(ProgressEvent::IndexFlushed {
            rows: self.store.len(),
        });
        Ok(())
    }
}

/// Archive the selected years of a show.
///
/// This is the main entry point for the library. It:
/// 1. Prepares the show directory and removes leftovers of interrupted runs
/// 2. Loads the index, starting empty if it is unreadable
/// 3. Lists each year and validates the entries
/// 4. Reconciles episodes on up to `max_concurrent` workers, upserting the
///    results into the index from this task only, in listing order
/// 5. Flushes the index and returns the run summary
pub async fn run_archive<C, L>(
    client: &C,
    listing: &L,
    years: &[i32],
    options: &RunOptions,
    reporter: SharedProgressReporter,
) -> Result<RunSummary, RunError>
where
    C: HttpClient + Clone + 'static,
    L: ListingSource + ?Sized,
{
    if years.is_empty() {
        return Err(RunError::NoYears);
    }

    let layout = ArchiveLayout::new(&options.root, &options.show);
    let show_dir = layout.show_dir();
    prepare_show_dir(&show_dir)?;

    let cleaned = sweep_partial_files(&show_dir);
    if cleaned > 0 {
        tracing::info!(count = cleaned, "removed partial downloads from an interrupted run");
        reporter.report(ProgressEvent::PartialFilesCleanedUp { count: cleaned });
    }

    let (store, recovery) = IndexStore::open(layout.index_path(), options.show.clone());
    if let Some(recovery) = recovery {
        reporter.report(ProgressEvent::IndexRecovered {
            path: store.path().to_path_buf(),
            error: recovery.error.to_string(),
            backup: recovery.backup,
        });
    }
    tracing::info!(path = %store.path().display(), rows = store.len(), "index loaded");

    let max_concurrent = options.max_concurrent.max(1);
    let reconciler = Arc::new(
        EpisodeReconciler::new(client.clone(), layout, reporter.clone())
            .with_force(options.force)
            .with_idle_timeout(options.idle_timeout),
    );
    let mut coordinator = Coordinator::new(store, options.flush_every, reporter.clone());
    let mut seen: HashSet<EpisodeId> = HashSet::new();

    for &year in years {
        reporter.report(ProgressEvent::FetchingListing { year });

        let raw_episodes = match listing.list_year(year, &mut coordinator.stats).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(year, error = %err, "skipping listing");
                coordinator.stats.record(RunEvent::ListingSkipped);
                reporter.report(ProgressEvent::ListingFailed {
                    year,
                    error: err.to_string(),
                });
                continue;
            }
        };

        let listed = raw_episodes.len();
        let mut episodes = Vec::with_capacity(listed);
        for raw in raw_episodes {
            match ListedEpisode::from_raw(raw, year) {
                Ok(episode) if seen.insert(episode.id(&options.show)) => episodes.push(episode),
                Ok(episode) => {
                    tracing::warn!(
                        title = %episode.title,
                        page = %episode.page_url,
                        "an earlier entry of this run already uses this file name, ignoring repeat"
                    );
                }
                Err(err) => {
                    tracing::warn!(year, error = %err, "skipping malformed listing entry");
                    coordinator.stats.record(RunEvent::ListingSkipped);
                }
            }
        }

        reporter.report(ProgressEvent::ListingReady {
            year,
            listed,
            to_reconcile: episodes.len(),
        });

        reconcile_all(&reconciler, episodes, max_concurrent, &mut coordinator).await;
    }

    coordinator.flush()?;

    let summary = coordinator.stats.summary(coordinator.store.len());
    tracing::info!(
        requests = summary.requests_sent,
        downloaded = summary.assets_downloaded(),
        skipped = summary.assets_skipped(),
        failed = summary.assets_failed(),
        rows = summary.index_rows,
        "run complete"
    );
    reporter.report(ProgressEvent::RunCompleted {
        summary: summary.clone(),
    });

    Ok(summary)
}

/// Reconcile `episodes` on up to `max_concurrent` tasks.
///
/// Results are absorbed in listing order whatever order the tasks finish in,
/// so new rows land in the index at their first-seen position. At most
/// `max_concurrent` consecutive episodes are in flight at once, which makes
/// the position modulo `max_concurrent` a free progress slot.
async fn reconcile_all<C>(
    reconciler: &Arc<EpisodeReconciler<C>>,
    episodes: Vec<ListedEpisode>,
    max_concurrent: usize,
    coordinator: &mut Coordinator,
) where
    C: HttpClient + 'static,
{
    let show = reconciler.layout().show().to_string();
    // Identities are unique within a run, so no prior row changes under a job
    let jobs: Vec<_> = episodes
        .into_iter()
        .map(|episode| {
            let prior = coordinator.store.get(&episode.id(&show)).cloned();
            (episode, prior)
        })
        .collect();

    let mut results = futures::stream::iter(jobs.into_iter().enumerate())
        .map(|(position, (episode, prior))| {
            let slot = position % max_concurrent;
            let reconciler = Arc::clone(reconciler);
            let task_episode = episode.clone();

            let handle = tokio::spawn(async move {
                let mut stats = RunStats::new();
                let record = reconciler
                    .reconcile(&task_episode, prior.as_ref(), slot, &mut stats)
                    .await;
                Reconciled { record, stats }
            });

            async move { (episode, handle.await) }
        })
        .buffered(max_concurrent);

    while let Some((episode, joined)) = results.next().await {
        coordinator.absorb(&episode, joined);
    }
}
