pub mod episode;
pub mod error;
pub mod http;
pub mod index;
pub mod listing;
pub mod logging;
pub mod progress;
pub mod reconcile;
pub mod state;
pub mod stats;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types for convenience
pub use episode::{
    ArchiveLayout, AssetKind, AssetOutcome, EpisodeId, EpisodeRecord, EpisodeStatus, materialize,
};
pub use error::{DownloadError, IndexError, ListingError, RunError, TransportError};
pub use http::{ByteStream, HttpClient, HttpResponse, ReqwestClient};
pub use index::IndexStore;
pub use listing::{ArchiveListing, DEFAULT_LISTING_URL, ListedEpisode, ListingSource, RawEpisode};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use reconcile::EpisodeReconciler;
pub use stats::{AssetCounts, RunEvent, RunStats, RunSummary};
pub use sync::{DEFAULT_SHOW, RunOptions, run_archive};
