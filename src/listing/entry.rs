// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{Datelike, NaiveDate};
use url::Url;

use crate::episode::{AssetKind, EpisodeId};
use crate::error::ListingError;

/// Date formats seen in listings, tried in order
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d %b %Y", "%d %B %Y"];

/// An episode as scraped from the archive, before any validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEpisode {
    pub title: Option<String>,
    pub number: Option<String>,
    pub page_url: Option<String>,
    pub pdf_url: Option<String>,
    pub mp3_url: Option<String>,
    pub release_date: Option<String>,
}

/// A validated listing entry, ready for reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEpisode {
    pub title: String,
    pub number: Option<String>,
    pub page_url: Url,
    pub pdf_url: Option<Url>,
    pub mp3_url: Option<Url>,
    pub release_date: Option<NaiveDate>,
    pub release_year: i32,
}

impl ListedEpisode {
    /// Validate a raw entry.
    ///
    /// Title and page URL are required; asset URLs are optional but must
    /// parse when given. The release year comes from the date when one is
    /// known, otherwise from the year the listing was requested for.
    pub fn from_raw(raw: RawEpisode, requested_year: i32) -> Result<Self, ListingError> {
        let title = non_blank(raw.title)
            .map(|t| collapse_whitespace(&t))
            .ok_or(ListingError::MissingTitle)?;

        let page_url = non_blank(raw.page_url).ok_or_else(|| ListingError::MissingPageUrl {
            title: title.clone(),
        })?;
        let page_url = parse_url(&title, &page_url)?;

        let pdf_url = non_blank(raw.pdf_url)
            .map(|u| parse_url(&title, &u))
            .transpose()?;
        let mp3_url = non_blank(raw.mp3_url)
            .map(|u| parse_url(&title, &u))
            .transpose()?;

        let release_date = match non_blank(raw.release_date) {
            Some(text) => Some(parse_release_date(&text).ok_or_else(|| {
                ListingError::InvalidDate {
                    title: title.clone(),
                    date_str: text.clone(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            release_year: release_date.map_or(requested_year, |d| d.year()),
            title,
            number: non_blank(raw.number),
            page_url,
            pdf_url,
            mp3_url,
            release_date,
        })
    }

    pub fn id(&self, show: &str) -> EpisodeId {
        EpisodeId::new(show, self.release_year, &self.title)
    }

    pub fn asset_url(&self, kind: AssetKind) -> Option<&Url> {
        match kind {
            AssetKind::Pdf => self.pdf_url.as_ref(),
            AssetKind::Mp3 => self.mp3_url.as_ref(),
        }
    }
}

/// Parse a release date in any of the formats the archive uses
pub fn parse_release_date(text: &str) -> Option<NaiveDate> {
    let text = collapse_whitespace(text);
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_url(title: &str, url: &str) -> Result<Url, ListingError> {
    Url::parse(url).map_err(|e| ListingError::InvalidUrl {
        title: title.to_string(),
        url: url.to_string(),
        source: e,
    })
}
