// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::Serialize;

use crate::episode::AssetKind;

/// Something worth counting during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    /// An HTTP request was issued (listing page, episode page or asset)
    RequestSent,
    /// An episode page was queued for fetching
    EpisodeScheduled,
    /// An episode page was fetched successfully
    EpisodeFetched,
    /// A listing page or entry could not be used
    ListingSkipped,
    /// An episode went through reconciliation
    EpisodeReconciled,
    /// Reconciling an episode stopped without producing a row
    EpisodeAborted,
    AssetDownloaded { kind: AssetKind, bytes: u64 },
    AssetSkipped(AssetKind),
    AssetFailed(AssetKind),
}

/// Per asset type counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetCounts {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes_downloaded: u64,
}

impl AssetCounts {
    fn merge(&mut self, other: &AssetCounts) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.bytes_downloaded += other.bytes_downloaded;
    }
}

/// Additive counters for a single run.
///
/// Each worker owns its own instance; the coordinator merges them as
/// results come back, so no counter is ever shared between tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    requests_sent: usize,
    episodes_scheduled: usize,
    episodes_fetched: usize,
    listings_skipped: usize,
    episodes_reconciled: usize,
    episodes_aborted: usize,
    pdf: AssetCounts,
    mp3: AssetCounts,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: RunEvent) {
        match event {
            RunEvent::RequestSent => self.requests_sent += 1,
            RunEvent::EpisodeScheduled => self.episodes_scheduled += 1,
            RunEvent::EpisodeFetched => self.episodes_fetched += 1,
            RunEvent::ListingSkipped => self.listings_skipped += 1,
            RunEvent::EpisodeReconciled => self.episodes_reconciled += 1,
            RunEvent::EpisodeAborted => self.episodes_aborted += 1,
            RunEvent::AssetDownloaded { kind, bytes } => {
                let counts = self.asset_mut(kind);
                counts.downloaded += 1;
                counts.bytes_downloaded += bytes;
            }
            RunEvent::AssetSkipped(kind) => self.asset_mut(kind).skipped += 1,
            RunEvent::AssetFailed(kind) => self.asset_mut(kind).failed += 1,
        }
    }

    /// Fold another collector's counts into this one
    pub fn merge(&mut self, other: &RunStats) {
        self.requests_sent += other.requests_sent;
        self.episodes_scheduled += other.episodes_scheduled;
        self.episodes_fetched += other.episodes_fetched;
        self.listings_skipped += other.listings_skipped;
        self.episodes_reconciled += other.episodes_reconciled;
        self.episodes_aborted += other.episodes_aborted;
        self.pdf.merge(&other.pdf);
        self.mp3.merge(&other.mp3);
    }

    pub fn asset(&self, kind: AssetKind) -> &AssetCounts {
        match kind {
            AssetKind::Pdf => &self.pdf,
            AssetKind::Mp3 => &self.mp3,
        }
    }

    fn asset_mut(&mut self, kind: AssetKind) -> &mut AssetCounts {
        match kind {
            AssetKind::Pdf => &mut self.pdf,
            AssetKind::Mp3 => &mut self.mp3,
        }
    }

    /// Snapshot the counters, adding the final size of the index
    pub fn summary(&self, index_rows: usize) -> RunSummary {
        RunSummary {
            requests_sent: self.requests_sent,
            episodes_scheduled: self.episodes_scheduled,
            episodes_fetched: self.episodes_fetched,
            episodes_reconciled: self.episodes_reconciled,
            episodes_aborted: self.episodes_aborted,
            listings_skipped: self.listings_skipped,
            index_rows,
            pdf: self.pdf,
            mp3: self.mp3,
        }
    }
}

/// End of run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub requests_sent: usize,
    pub episodes_scheduled: usize,
    pub episodes_fetched: usize,
    pub episodes_reconciled: usize,
    pub episodes_aborted: usize,
    pub listings_skipped: usize,
    pub index_rows: usize,
    pub pdf: AssetCounts,
    pub mp3: AssetCounts,
}

impl RunSummary {
    pub fn assets_downloaded(&self) -> usize {
        self.pdf.downloaded + self.mp3.downloaded
    }

    pub fn assets_skipped(&self) -> usize {
        self.pdf.skipped + self.mp3.skipped
    }

    pub fn assets_failed(&self) -> usize {
        self.pdf.failed + self.mp3.failed
    }

    /// True when assets were attempted and every single one failed
    pub fn nothing_succeeded(&self) -> bool {
        self.assets_failed() > 0 && self.assets_downloaded() == 0 && self.assets_skipped() == 0
    }
}
