mod entry;
mod fetch;
mod parse;

pub use entry::{ListedEpisode, RawEpisode, parse_release_date};
pub use fetch::{ArchiveListing, DEFAULT_LISTING_URL, DEFAULT_PAGE_CONCURRENCY, ListingSource};
pub use parse::{
    EpisodePage, ListingEntry, extract_date_and_year, parse_episode_page, parse_listing,
};
