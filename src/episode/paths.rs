// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use super::AssetKind;

/// Maximum length for a sanitized path component
const MAX_COMPONENT_LENGTH: usize = 100;

/// Component used when sanitizing leaves nothing behind
const FALLBACK_COMPONENT: &str = "untitled";

/// Extension of the episode index file
pub const INDEX_EXTENSION: &str = "csv";

/// Directory layout of an archive: `<root>/<Show>/<Year>/<Title>.<ext>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    root: PathBuf,
    show: String,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, show: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            show: show.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Show name as given, used for identities and display
    pub fn show(&self) -> &str {
        &self.show
    }

    /// `<root>/<Show>`
    pub fn show_dir(&self) -> PathBuf {
        self.root.join(sanitize_component(&self.show))
    }

    /// `<root>/<Show>/<Year>`
    pub fn year_dir(&self, year: i32) -> PathBuf {
        self.show_dir().join(year.to_string())
    }

    /// `<root>/<Show>/<Year>/<Title>.<ext>`
    pub fn asset_path(&self, year: i32, title: &str, kind: AssetKind) -> PathBuf {
        self.year_dir(year)
            .join(format!("{}.{}", sanitize_component(title), kind.extension()))
    }

    /// `<root>/<Show>/<Show>.csv`
    pub fn index_path(&self) -> PathBuf {
        let show = sanitize_component(&self.show);
        self.show_dir().join(format!("{show}.{INDEX_EXTENSION}"))
    }
}

/// Check if a character survives sanitization (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

/// Turn free text into a portable file or directory name.
///
/// Every run of characters outside `[A-Za-z0-9]` collapses to a single
/// underscore, leading and trailing underscores are dropped, and the result
/// is capped at [`MAX_COMPONENT_LENGTH`] characters.
pub fn sanitize_component(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_separator = true;

    for c in text.chars() {
        if is_valid_filename_char(c) {
            result.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            result.push('_');
            last_was_separator = true;
        }
    }

    let trimmed = result.trim_end_matches('_');
    let truncated = truncate_at_boundary(trimmed, MAX_COMPONENT_LENGTH);

    if truncated.is_empty() {
        FALLBACK_COMPONENT.to_string()
    } else {
        truncated
    }
}

/// Truncate string at a word boundary
fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    // Only ASCII survives sanitization, so byte slicing is safe here
    let truncated = &s[..max_len];
    if let Some(pos) = truncated.rfind('_')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('_').to_string()
}
