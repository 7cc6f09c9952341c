mod download;
mod paths;
mod record;

pub use download::{
    AssetOutcome, AssetRequest, DownloadContext, PARTIAL_SUFFIX, existing_size, materialize,
    partial_path,
};
pub use paths::{ArchiveLayout, INDEX_EXTENSION, sanitize_component};
pub use record::{AssetKind, EpisodeId, EpisodeRecord, EpisodeStatus};
