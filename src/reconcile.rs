// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use crate::episode::{
    ArchiveLayout, AssetKind, AssetRequest, DownloadContext, EpisodeRecord, EpisodeStatus,
    existing_size, materialize,
};
use crate::http::{HttpClient, READ_TIMEOUT};
use crate::listing::ListedEpisode;
use crate::progress::SharedProgressReporter;
use crate::stats::{RunEvent, RunStats};

/// Brings one listed episode in line with the filesystem and produces the
/// index row that describes the result.
pub struct EpisodeReconciler<C> {
    client: C,
    layout: ArchiveLayout,
    force: bool,
    idle_timeout: Duration,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient> EpisodeReconciler<C> {
    pub fn new(client: C, layout: ArchiveLayout, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            layout,
            force: false,
            idle_timeout: READ_TIMEOUT,
            reporter,
        }
    }

    /// Re-download assets even when they are already on disk
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Abandon an asset transfer that delivers nothing for this long
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Reconcile `episode` against disk, starting from its previous row.
    ///
    /// Asset failures are recorded in the returned row and in `stats`; they
    /// never escape this call.
    pub async fn reconcile(
        &self,
        episode: &ListedEpisode,
        prior: Option<&EpisodeRecord>,
        slot: usize,
        stats: &mut RunStats,
    ) -> EpisodeRecord {
        let show = self.layout.show();
        let year = episode.release_year;

        let mut record = prior.cloned().unwrap_or_else(|| {
            EpisodeRecord::pending(show, year, &episode.title, episode.page_url.as_str())
        });
        let previous_status = record.status;

        // Files on disk belong to the page that last held this identity
        let page_changed = prior.is_some_and(|p| p.page_url != episode.page_url.as_str());
        if page_changed {
            tracing::warn!(
                episode = %record.id,
                old_page = %record.page_url,
                new_page = %episode.page_url,
                "identity now points at a different page, fetching its assets again"
            );
        }

        record.id = episode.id(show);
        record.title = episode.title.clone();
        record.page_url = episode.page_url.to_string();
        record.release_date = episode.release_date.or(record.release_date);
        record.release_year = year;

        let context = DownloadContext {
            slot,
            episode_title: episode.title.clone(),
        };

        let mut results = Vec::with_capacity(AssetKind::ALL.len());
        for kind in AssetKind::ALL {
            let Some(url) = episode.asset_url(kind) else {
                record.set_asset(kind, None, None);
                continue;
            };

            let target = self.layout.asset_path(year, &episode.title, kind);
            let request = AssetRequest {
                kind,
                url: url.as_str(),
                target: &target,
                force: self.force || page_changed,
                idle_timeout: self.idle_timeout,
            };
            let outcome = materialize(&self.client, &request, &context, &self.reporter, stats).await;

            // A failed forced fetch leaves the previous file in place
            let on_disk = outcome.is_present() || existing_size(&target).await.is_some();
            record.set_asset(kind, Some(url.to_string()), on_disk.then_some(target));
            results.push(outcome.is_present());
        }

        record.status = EpisodeStatus::from_asset_results(&results);
        stats.record(RunEvent::EpisodeReconciled);

        if previous_status != record.status {
            tracing::info!(
                episode = %record.id,
                from = %previous_status,
                to = %record.status,
                "episode status changed"
            );
        }

        record
    }
}
