use std::path::Path;

use crate::episode::PARTIAL_SUFFIX;
use crate::error::RunError;

/// Create the show directory and make sure files can be written into it.
///
/// This is the only check whose failure aborts a run.
pub fn prepare_show_dir(show_dir: &Path) -> Result<(), RunError> {
    std::fs::create_dir_all(show_dir).map_err(|e| RunError::CreateDirectoryFailed {
        path: show_dir.to_path_buf(),
        source: e,
    })?;

    // Dropping the probe removes it again
    tempfile::Builder::new()
        .prefix(".podarchive-probe-")
        .tempfile_in(show_dir)
        .map_err(|e| RunError::NotWritable {
            path: show_dir.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

/// Remove `.partial` files left behind by interrupted downloads.
///
/// Looks in the show directory and its year directories. Returns the number
/// of files removed; unreadable directories are skipped.
pub fn sweep_partial_files(show_dir: &Path) -> usize {
    let mut cleaned = 0;

    let Ok(entries) = std::fs::read_dir(show_dir) else {
        return 0;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleaned += sweep_dir(&path);
        } else if is_partial(&path) && remove(&path) {
            cleaned += 1;
        }
    }

    cleaned
}

fn sweep_dir(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::debug!(dir = %dir.display(), "cannot read directory during sweep");
        return 0;
    };

    entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_partial(path))
        .filter(|path| remove(path))
        .count()
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(PARTIAL_SUFFIX))
}

fn remove(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed partial download");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove partial download");
            false
        }
    }
}
