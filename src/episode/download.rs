use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::AssetKind;
use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::stats::{RunEvent, RunStats};

/// Suffix of the temporary file a download streams into
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Context for tracking a download in concurrent scenarios
#[derive(Debug, Clone)]
pub struct DownloadContext {
    /// Slot ID (0 to max_concurrent-1) for progress bar management
    pub slot: usize,
    /// Title of the episode the asset belongs to
    pub episode_title: String,
}

/// One asset to bring onto disk
#[derive(Debug, Clone, Copy)]
pub struct AssetRequest<'a> {
    pub kind: AssetKind,
    pub url: &'a str,
    pub target: &'a Path,
    /// Fetch even when `target` already holds a non-empty file
    pub force: bool,
    /// Longest wait for the next chunk before the transfer is abandoned
    pub idle_timeout: Duration,
}

/// What happened to an asset
#[derive(Debug)]
pub enum AssetOutcome {
    /// Freshly fetched and moved into place
    Downloaded { bytes: u64 },
    /// Already present and non-empty; no request was made
    Skipped { bytes: u64 },
    /// Nothing usable was written to the target path
    Failed(DownloadError),
}

impl AssetOutcome {
    /// Whether the asset is on disk after materialization
    pub fn is_present(&self) -> bool {
        !matches!(self, AssetOutcome::Failed(_))
    }
}

/// Temporary path a download for `target` is streamed into
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Size of `path` if it is a regular file holding at least one byte
pub async fn existing_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

/// Make sure `request.target` holds a complete copy of `request.url`.
///
/// An existing non-empty file is trusted and left alone unless `force` is
/// set. Otherwise the body is streamed into a `.partial` sibling which is
/// renamed over the target only once the transfer is complete and non-empty.
/// On failure the temporary file is removed, so the target is never left
/// truncated.
pub async fn materialize<C: HttpClient>(
    client: &C,
    request: &AssetRequest<'_>,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
    stats: &mut RunStats,
) -> AssetOutcome {
    let kind = request.kind;

    if !request.force
        && let Some(bytes) = existing_size(request.target).await
    {
        tracing::debug!(path = %request.target.display(), bytes, "asset already present");
        stats.record(RunEvent::AssetSkipped(kind));
        return AssetOutcome::Skipped { bytes };
    }

    let partial = partial_path(request.target);
    match download_to(client, request, &partial, context, reporter, stats).await {
        Ok(bytes) => {
            tracing::info!(url = request.url, path = %request.target.display(), bytes, "asset downloaded");
            stats.record(RunEvent::AssetDownloaded { kind, bytes });
            reporter.report(ProgressEvent::AssetDownloaded {
                slot: context.slot,
                episode_title: context.episode_title.clone(),
                kind,
                bytes,
            });
            AssetOutcome::Downloaded { bytes }
        }
        Err(err) => {
            if let Err(rm_err) = tokio::fs::remove_file(&partial).await
                && rm_err.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %partial.display(), error = %rm_err, "failed to remove partial download");
            }
            tracing::warn!(url = request.url, error = %err, "asset download failed");
            stats.record(RunEvent::AssetFailed(kind));
            reporter.report(ProgressEvent::AssetFailed {
                slot: context.slot,
                episode_title: context.episode_title.clone(),
                kind,
                error: err.to_string(),
            });
            AssetOutcome::Failed(err)
        }
    }
}

async fn download_to<C: HttpClient>(
    client: &C,
    request: &AssetRequest<'_>,
    partial: &Path,
    context: &DownloadContext,
    reporter: &SharedProgressReporter,
    stats: &mut RunStats,
) -> Result<u64, DownloadError> {
    let url = request.url;

    if let Some(parent) = request.target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    stats.record(RunEvent::RequestSent);
    let response = client
        .get(url)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    reporter.report(ProgressEvent::AssetStarting {
        slot: context.slot,
        episode_title: context.episode_title.clone(),
        kind: request.kind,
        content_length: response.content_length,
    });

    let mut file = File::create(partial)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: partial.to_path_buf(),
            source: e,
        })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    loop {
        let next = tokio::time::timeout(request.idle_timeout, stream.next())
            .await
            .map_err(|_| DownloadError::Stalled {
                url: url.to_string(),
                idle: request.idle_timeout,
                received: bytes_downloaded,
            })?;
        let Some(chunk_result) = next else {
            break;
        };
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: partial.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::AssetProgress {
            slot: context.slot,
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    // Data must be on disk before the rename makes it visible
    let write_err = |e| DownloadError::FileWriteFailed {
        path: partial.to_path_buf(),
        source: e,
    };
    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    if bytes_downloaded == 0 {
        return Err(DownloadError::EmptyBody {
            url: url.to_string(),
        });
    }

    if let Some(expected) = response.content_length
        && bytes_downloaded < expected
    {
        return Err(DownloadError::Truncated {
            url: url.to_string(),
            expected,
            received: bytes_downloaded,
        });
    }

    tokio::fs::rename(partial, request.target)
        .await
        .map_err(|e| DownloadError::RenameFailed {
            from: partial.to_path_buf(),
            to: request.target.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use crate::test_support::{MockHttpClient, MockResponse};

    use tempfile::tempdir;

    const URL: &str = "https://example.com/episode.mp3";

    fn context() -> DownloadContext {
        DownloadContext {
            slot: 0,
            episode_title: "Test Episode".to_string(),
        }
    }

    async fn run(client: &MockHttpClient, target: &Path, force: bool) -> (AssetOutcome, RunStats) {
        let mut stats = RunStats::new();
        let request = AssetRequest {
            kind: AssetKind::Mp3,
            url: URL,
            target,
            force,
            idle_timeout: Duration::from_secs(5),
        };
        let outcome = materialize(client, &request, &context(), &NoopReporter::shared(), &mut stats).await;
        (outcome, stats)
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/a/b/episode.mp3")),
            PathBuf::from("/a/b/episode.mp3.partial")
        );
    }

    #[tokio::test]
    async fn download_writes_file_and_creates_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("show").join("2023").join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::Body(b"test audio content".to_vec()));

        let (outcome, stats) = run(&client, &target, false).await;

        assert!(matches!(outcome, AssetOutcome::Downloaded { bytes: 18 }));
        assert_eq!(std::fs::read(&target).unwrap(), b"test audio content");
        assert!(!partial_path(&target).exists());
        assert_eq!(stats.asset(AssetKind::Mp3).downloaded, 1);
        assert_eq!(stats.summary(0).requests_sent, 1);
    }

    #[tokio::test]
    async fn existing_file_is_skipped_without_request() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        std::fs::write(&target, b"already here").unwrap();
        let client = MockHttpClient::new().with(URL, MockResponse::Body(b"new".to_vec()));

        let (outcome, stats) = run(&client, &target, false).await;

        assert!(matches!(outcome, AssetOutcome::Skipped { bytes: 12 }));
        assert_eq!(client.hits(URL), 0);
        assert_eq!(std::fs::read(&target).unwrap(), b"already here");
        assert_eq!(stats.asset(AssetKind::Mp3).skipped, 1);
    }

    #[tokio::test]
    async fn empty_existing_file_is_fetched_again() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        std::fs::write(&target, b"").unwrap();
        let client = MockHttpClient::new().with(URL, MockResponse::Body(b"audio".to_vec()));

        let (outcome, _) = run(&client, &target, false).await;

        assert!(matches!(outcome, AssetOutcome::Downloaded { bytes: 5 }));
        assert_eq!(std::fs::read(&target).unwrap(), b"audio");
    }

    #[tokio::test]
    async fn force_refetches_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        std::fs::write(&target, b"old").unwrap();
        let client = MockHttpClient::new().with(URL, MockResponse::Body(b"fresh".to_vec()));

        let (outcome, _) = run(&client, &target, true).await;

        assert!(matches!(outcome, AssetOutcome::Downloaded { bytes: 5 }));
        assert_eq!(std::fs::read(&target).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn failed_forced_fetch_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        std::fs::write(&target, b"old").unwrap();
        let client = MockHttpClient::new().with(URL, MockResponse::DropAfter(b"fr".to_vec()));

        let (outcome, _) = run(&client, &target, true).await;

        assert!(matches!(outcome, AssetOutcome::Failed(_)));
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn http_error_fails_without_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::Status(404));

        let (outcome, stats) = run(&client, &target, false).await;

        match outcome {
            AssetOutcome::Failed(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus failure, got {other:?}"),
        }
        assert!(!target.exists());
        assert_eq!(stats.asset(AssetKind::Mp3).failed, 1);
    }

    #[tokio::test]
    async fn interrupted_transfer_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::DropAfter(b"half of the audio".to_vec()));

        let (outcome, _) = run(&client, &target, false).await;

        assert!(matches!(
            outcome,
            AssetOutcome::Failed(DownloadError::StreamFailed { .. })
        ));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn stalled_transfer_times_out_and_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::Stalled(b"first".to_vec()));
        let request = AssetRequest {
            kind: AssetKind::Mp3,
            url: URL,
            target: &target,
            force: false,
            idle_timeout: Duration::from_millis(50),
        };
        let mut stats = RunStats::new();

        let outcome = materialize(&client, &request, &context(), &NoopReporter::shared(), &mut stats).await;

        assert!(matches!(
            outcome,
            AssetOutcome::Failed(DownloadError::Stalled { received: 5, .. })
        ));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
        assert_eq!(stats.asset(AssetKind::Mp3).failed, 1);
    }

    #[tokio::test]
    async fn short_body_is_rejected() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(
            URL,
            MockResponse::ShortBody {
                body: b"abc".to_vec(),
                declared: 10,
            },
        );

        let (outcome, _) = run(&client, &target, false).await;

        assert!(matches!(
            outcome,
            AssetOutcome::Failed(DownloadError::Truncated {
                expected: 10,
                received: 3,
                ..
            })
        ));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn empty_body_is_a_failure() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::Body(Vec::new()));

        let (outcome, _) = run(&client, &target, false).await;

        assert!(matches!(
            outcome,
            AssetOutcome::Failed(DownloadError::EmptyBody { .. })
        ));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn connection_failure_is_reported() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("episode.mp3");
        let client = MockHttpClient::new().with(URL, MockResponse::ConnectFailed);

        let (outcome, stats) = run(&client, &target, false).await;

        assert!(matches!(
            outcome,
            AssetOutcome::Failed(DownloadError::HttpFailed { .. })
        ));
        assert_eq!(stats.summary(0).requests_sent, 1);
    }
}
