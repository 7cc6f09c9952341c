// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::paths::sanitize_component;

/// The downloadable files attached to an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Transcript
    Pdf,
    /// Audio
    Mp3,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Pdf, AssetKind::Mp3];

    pub fn extension(self) -> &'static str {
        match self {
            AssetKind::Pdf => "pdf",
            AssetKind::Mp3 => "mp3",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Pdf => "PDF",
            AssetKind::Mp3 => "MP3",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Overall download state of an episode as stored in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EpisodeStatus {
    /// First sighting, nothing attempted yet
    #[default]
    Pending,
    /// Every applicable asset is on disk
    Downloaded,
    /// Some assets are on disk, others failed
    PartiallyDownloaded,
    /// Every applicable asset failed
    Failed,
    /// The episode has no downloadable assets
    Skipped,
}

impl EpisodeStatus {
    /// Combine per-asset results into an episode status.
    ///
    /// Each entry is `true` when that asset ended up on disk. Assets without
    /// a remote URL must not be passed in.
    pub fn from_asset_results(results: &[bool]) -> Self {
        let succeeded = results.iter().filter(|ok| **ok).count();
        match (succeeded, results.len()) {
            (_, 0) => EpisodeStatus::Skipped,
            (s, n) if s == n => EpisodeStatus::Downloaded,
            (0, _) => EpisodeStatus::Failed,
            _ => EpisodeStatus::PartiallyDownloaded,
        }
    }
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EpisodeStatus::Pending => "Pending",
            EpisodeStatus::Downloaded => "Downloaded",
            EpisodeStatus::PartiallyDownloaded => "PartiallyDownloaded",
            EpisodeStatus::Failed => "Failed",
            EpisodeStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Normalized identity of an episode: show, release year and title.
///
/// Show and title are reduced to the lowercased file name component they are
/// stored under, with dashes for separators. Case and punctuation differences
/// map to the same identity, and two distinct identities never share a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EpisodeId {
    show: String,
    year: i32,
    title: String,
}

impl EpisodeId {
    pub fn new(show: &str, year: i32, title: &str) -> Self {
        Self {
            show: slugify(show),
            year,
            title: slugify(title),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn title_slug(&self) -> &str {
        &self.title
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.show, self.year, self.title)
    }
}

fn slugify(text: &str) -> String {
    sanitize_component(text).to_ascii_lowercase().replace('_', "-")
}

/// One row of the episode index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRecord {
    pub id: EpisodeId,
    pub title: String,
    pub page_url: String,
    pub pdf_url: Option<String>,
    pub pdf_path: Option<PathBuf>,
    pub mp3_url: Option<String>,
    pub mp3_path: Option<PathBuf>,
    pub release_date: Option<NaiveDate>,
    pub release_year: i32,
    pub status: EpisodeStatus,
}

impl EpisodeRecord {
    /// A fresh `Pending` record for a first-seen episode
    pub fn pending(show: &str, year: i32, title: &str, page_url: &str) -> Self {
        Self {
            id: EpisodeId::new(show, year, title),
            title: title.to_string(),
            page_url: page_url.to_string(),
            pdf_url: None,
            pdf_path: None,
            mp3_url: None,
            mp3_path: None,
            release_date: None,
            release_year: year,
            status: EpisodeStatus::Pending,
        }
    }

    pub fn asset_url(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::Pdf => self.pdf_url.as_deref(),
            AssetKind::Mp3 => self.mp3_url.as_deref(),
        }
    }

    pub fn asset_path(&self, kind: AssetKind) -> Option<&PathBuf> {
        match kind {
            AssetKind::Pdf => self.pdf_path.as_ref(),
            AssetKind::Mp3 => self.mp3_path.as_ref(),
        }
    }

    pub fn set_asset(&mut self, kind: AssetKind, url: Option<String>, path: Option<PathBuf>) {
        match kind {
            AssetKind::Pdf => {
                self.pdf_url = url;
                self.pdf_path = path;
            }
            AssetKind::Mp3 => {
                self.mp3_url = url;
                self.mp3_path = path;
            }
        }
    }
}
