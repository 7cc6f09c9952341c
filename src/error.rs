// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an [`HttpClient`](crate::http::HttpClient) implementation
#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("I/O error while reading response: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when fetching or interpreting listing pages
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Failed to fetch listing page {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP error {status} for listing page {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Listing page {url} contains no recognisable episode entries")]
    NoEntries { url: String },

    #[error("Episode listing entry has no title")]
    MissingTitle,

    #[error("Episode '{title}' has no page URL")]
    MissingPageUrl { title: String },

    #[error("Episode '{title}' has an invalid URL '{url}': {source}")]
    InvalidUrl {
        title: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Episode '{title}' has an unrecognised release date '{date_str}'")]
    InvalidDate { title: String, date_str: String },
}

/// Errors that can occur while materializing a single asset
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("Server returned an empty body for {url}")]
    EmptyBody { url: String },

    #[error("Transfer of {url} stalled for {idle:?} after {received} bytes")]
    Stalled {
        url: String,
        idle: std::time::Duration,
        received: u64,
    },

    #[error("Transfer of {url} ended after {received} of {expected} bytes")]
    Truncated {
        url: String,
        expected: u64,
        received: u64,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} into place at {to}: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when reading or writing the episode index
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read index file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index file {path} is malformed: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write index file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize index row for {path}: {source}")]
    SerializeFailed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to replace index file {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexError {
    /// Whether the persisted table exists but cannot be interpreted
    pub fn is_corrupt(&self) -> bool {
        matches!(self, IndexError::Corrupt { .. })
    }
}

/// Fatal errors that abort a whole run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Failed to create archive directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive directory {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("No years selected")]
    NoYears,
}
