// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::episode::{EpisodeId, EpisodeRecord, EpisodeStatus};
use crate::error::IndexError;

/// Column headers of the index file, in order
pub const INDEX_HEADERS: [&str; 9] = [
    "Title",
    "PDF_URL",
    "PDF_Path",
    "MP3_URL",
    "MP3_Path",
    "Page_URL",
    "Release_Date",
    "Release_Year",
    "Status",
];

/// Suffix given to an unreadable index file when it is set aside
pub const CORRUPT_SUFFIX: &str = ".corrupt";

/// On-disk shape of one index row
#[derive(Debug, Serialize, Deserialize)]
struct IndexRow {
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "PDF_URL")]
    pdf_url: Option<String>,
    #[serde(rename = "PDF_Path")]
    pdf_path: Option<String>,
    #[serde(rename = "MP3_URL")]
    mp3_url: Option<String>,
    #[serde(rename = "MP3_Path")]
    mp3_path: Option<String>,
    #[serde(rename = "Page_URL")]
    page_url: String,
    #[serde(rename = "Release_Date")]
    release_date: Option<NaiveDate>,
    #[serde(rename = "Release_Year")]
    release_year: i32,
    #[serde(rename = "Status")]
    status: EpisodeStatus,
}

impl IndexRow {
    fn from_record(record: &EpisodeRecord) -> Self {
        let path_str = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());
        Self {
            title: record.title.clone(),
            pdf_url: record.pdf_url.clone(),
            pdf_path: path_str(&record.pdf_path),
            mp3_url: record.mp3_url.clone(),
            mp3_path: path_str(&record.mp3_path),
            page_url: record.page_url.clone(),
            release_date: record.release_date,
            release_year: record.release_year,
            status: record.status,
        }
    }

    fn into_record(self, show: &str) -> EpisodeRecord {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        EpisodeRecord {
            id: EpisodeId::new(show, self.release_year, &self.title),
            title: self.title,
            page_url: self.page_url,
            pdf_url: non_empty(self.pdf_url),
            pdf_path: non_empty(self.pdf_path).map(PathBuf::from),
            mp3_url: non_empty(self.mp3_url),
            mp3_path: non_empty(self.mp3_path).map(PathBuf::from),
            release_date: self.release_date,
            release_year: self.release_year,
            status: self.status,
        }
    }
}

/// Why the store started empty, returned by [`IndexStore::open`]
#[derive(Debug)]
pub struct IndexRecovery {
    pub error: IndexError,
    /// Where the unreadable file was moved, if the move succeeded
    pub backup: Option<PathBuf>,
}

/// Persistent table of episodes, one row per identity.
///
/// Rows keep the position at which their identity was first seen. The store
/// is single-writer: callers serialize `upsert` and `flush`.
#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    show: String,
    records: Vec<EpisodeRecord>,
    positions: HashMap<EpisodeId, usize>,
}

impl IndexStore {
    /// An empty store that will be written to `path`
    pub fn empty(path: impl Into<PathBuf>, show: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            show: show.into(),
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Read the persisted table. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>, show: impl Into<String>) -> Result<Self, IndexError> {
        let mut store = Self::empty(path, show);

        let file = match std::fs::File::open(&store.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(store),
            Err(e) => {
                return Err(IndexError::ReadFailed {
                    path: store.path.clone(),
                    source: e,
                });
            }
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut rows = Vec::new();
        for row in reader.deserialize::<IndexRow>() {
            let row = row.map_err(|e| IndexError::Corrupt {
                path: store.path.clone(),
                source: e,
            })?;
            rows.push(row);
        }

        for row in rows {
            let record = row.into_record(&store.show);
            store.upsert(record);
        }

        Ok(store)
    }

    /// Load the table, falling back to an empty one if it cannot be read.
    ///
    /// An unreadable file is renamed with a [`CORRUPT_SUFFIX`] so the next
    /// flush does not destroy it.
    pub fn open(path: impl Into<PathBuf>, show: impl Into<String>) -> (Self, Option<IndexRecovery>) {
        let path = path.into();
        let show = show.into();

        match Self::load(path.clone(), show.clone()) {
            Ok(store) => (store, None),
            Err(error) => {
                let backup = match quarantine(&path) {
                    Ok(backup) => Some(backup),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "could not set aside unreadable index");
                        None
                    }
                };
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    backup = ?backup,
                    "index unreadable, starting from an empty table"
                );
                (Self::empty(path, show), Some(IndexRecovery { error, backup }))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn show(&self) -> &str {
        &self.show
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows in first-seen order
    pub fn records(&self) -> &[EpisodeRecord] {
        &self.records
    }

    pub fn get(&self, id: &EpisodeId) -> Option<&EpisodeRecord> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    /// Insert or replace the row for `record.id`. Returns `true` when the
    /// identity was not in the table before.
    pub fn upsert(&mut self, record: EpisodeRecord) -> bool {
        match self.positions.get(&record.id) {
            Some(&pos) => {
                self.records[pos] = record;
                false
            }
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                true
            }
        }
    }

    /// Write the whole table, replacing the previous file atomically
    pub fn flush(&self) -> Result<(), IndexError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |e: std::io::Error| IndexError::WriteFailed {
            path: self.path.clone(),
            source: e,
        };

        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".index-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(write_err)?;

        {
            let serialize_err = |e: csv::Error| IndexError::SerializeFailed {
                path: self.path.clone(),
                source: e,
            };

            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(INDEX_HEADERS).map_err(serialize_err)?;
            for record in &self.records {
                writer
                    .serialize(IndexRow::from_record(record))
                    .map_err(serialize_err)?;
            }
            writer.flush().map_err(write_err)?;
        }

        tmp.as_file_mut().flush().map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path)
            .map_err(|e| IndexError::PersistFailed {
                path: self.path.clone(),
                source: e.error,
            })?;

        tracing::debug!(path = %self.path.display(), rows = self.records.len(), "index flushed");
        Ok(())
    }
}

/// Move an unreadable index file out of the way, returning its new path
pub fn quarantine(path: &Path) -> std::io::Result<PathBuf> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(CORRUPT_SUFFIX);
    let backup = path.with_file_name(name);
    std::fs::rename(path, &backup)?;
    Ok(backup)
}
