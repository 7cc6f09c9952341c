// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::OnceCell;
use url::Url;

use super::entry::RawEpisode;
use super::parse::{EpisodePage, ListingEntry, parse_episode_page, parse_listing};
use crate::error::ListingError;
use crate::http::HttpClient;
use crate::stats::{RunEvent, RunStats};

/// Listing page of the 6 Minute English archive
pub const DEFAULT_LISTING_URL: &str =
    "https://www.bbc.co.uk/learningenglish/english/features/6-minute-english";

/// Episode pages fetched concurrently by default
pub const DEFAULT_PAGE_CONCURRENCY: usize = 4;

/// Supplies raw episode records for a year
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// List the episodes released in `year`, in listing order.
    ///
    /// A page-level failure is returned as an error; individual entries
    /// that cannot be fetched are counted in `stats` and left out.
    async fn list_year(&self, year: i32, stats: &mut RunStats)
    -> Result<Vec<RawEpisode>, ListingError>;
}

/// Listing source backed by the archive website
pub struct ArchiveListing<C> {
    client: C,
    listing_url: Url,
    page_concurrency: usize,
    page: OnceCell<String>,
}

impl<C: HttpClient> ArchiveListing<C> {
    pub fn new(client: C, listing_url: Url) -> Self {
        Self {
            client,
            listing_url,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            page: OnceCell::new(),
        }
    }

    pub fn with_page_concurrency(mut self, page_concurrency: usize) -> Self {
        self.page_concurrency = page_concurrency.max(1);
        self
    }

    /// The listing page body, fetched at most once per source
    async fn listing_page(&self, stats: &mut RunStats) -> Result<&str, ListingError> {
        let page = self
            .page
            .get_or_try_init(move || async move {
                stats.record(RunEvent::RequestSent);
                fetch_text(&self.client, self.listing_url.as_str()).await
            })
            .await?;
        Ok(page.as_str())
    }

    async fn fetch_episode_page(&self, entry: &ListingEntry) -> Result<EpisodePage, ListingError> {
        let html = fetch_text(&self.client, entry.page_url.as_str()).await?;
        Ok(parse_episode_page(&html, &entry.page_url))
    }
}

#[async_trait]
impl<C: HttpClient> ListingSource for ArchiveListing<C> {
    async fn list_year(
        &self,
        year: i32,
        stats: &mut RunStats,
    ) -> Result<Vec<RawEpisode>, ListingError> {
        let html = self.listing_page(stats).await?;
        let entries = parse_listing(html, &self.listing_url)?;

        let mut seen = HashSet::new();
        let wanted: Vec<ListingEntry> = entries
            .into_iter()
            .filter(|entry| entry.release_year == Some(year))
            .filter(|entry| seen.insert(entry.page_url.clone()))
            .collect();

        tracing::info!(year, episodes = wanted.len(), "listing filtered");

        for _ in &wanted {
            stats.record(RunEvent::EpisodeScheduled);
        }

        let pages: Vec<_> = futures::stream::iter(wanted.clone())
            .map(|entry| async move { self.fetch_episode_page(&entry).await })
            .buffered(self.page_concurrency)
            .collect()
            .await;

        let mut episodes = Vec::with_capacity(wanted.len());
        for (entry, page) in wanted.into_iter().zip(pages) {
            stats.record(RunEvent::RequestSent);
            match page {
                Ok(page) => {
                    stats.record(RunEvent::EpisodeFetched);
                    tracing::info!(url = %entry.page_url, "fetched episode page");
                    episodes.push(raw_episode(entry, page));
                }
                Err(err) => {
                    tracing::warn!(url = %entry.page_url, error = %err, "skipping episode page");
                    stats.record(RunEvent::ListingSkipped);
                }
            }
        }

        Ok(episodes)
    }
}

fn raw_episode(entry: ListingEntry, page: EpisodePage) -> RawEpisode {
    let title = Some(entry.title).filter(|t| !t.is_empty()).or(page.heading);

    RawEpisode {
        title,
        number: entry.number,
        page_url: Some(entry.page_url.to_string()),
        pdf_url: page.pdf_url.map(String::from),
        mp3_url: page.mp3_url.map(String::from),
        release_date: entry.release_date,
    }
}

async fn fetch_text<C: HttpClient>(client: &C, url: &str) -> Result<String, ListingError> {
    let fetch_err = |e| ListingError::FetchFailed {
        url: url.to_string(),
        source: e,
    };

    let response = client.get(url).await.map_err(fetch_err)?;
    if !response.is_success() {
        return Err(ListingError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let body = response.collect().await.map_err(fetch_err)?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}
