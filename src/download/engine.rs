//! Download engine for concurrent file downloads with retry support.
//!
//! This module provides the `DownloadEngine` which coordinates concurrent
//! downloads using a semaphore-based concurrency control pattern, with
//! automatic retry on transient failures using exponential backoff.
//!
//! The engine consumes the resolved link map: direct links are streamed to
//! disk through the stage-then-publish protocol of [`HttpClient`], mirror
//! links are collected as manual-download instructions without any network
//! activity, and an optional confirmation gate can veto individual tasks
//! before they start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::{DownloadError, DownloadFileResult, HttpClient};
use crate::links::{DownloadLink, OriginKind};
use crate::ordered::OrderedMap;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Per-item veto consulted before each direct download starts.
///
/// Declining skips the task without recording an error.
pub trait ConfirmGate: Send + Sync {
    /// Returns `true` to run the download, `false` to skip it.
    fn confirm(&self, link: &DownloadLink) -> bool;
}

/// Builds a per-task byte-progress callback for a starting download.
///
/// The CLI hands out one progress bar per file through this hook; the
/// returned closure receives (bytes so far, declared total) per chunk.
pub type ProgressFactory =
    dyn Fn(&DownloadLink) -> Box<dyn Fn(u64, Option<u64>) + Send + Sync> + Send + Sync;

/// A download that streamed and published successfully.
#[derive(Debug)]
pub struct CompletedDownload {
    /// Source URL.
    pub url: String,
    /// Title of the page the link came from.
    pub title: String,
    /// Published destination path.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

/// A download that failed after exhausting its attempts.
#[derive(Debug)]
pub struct FailedDownload {
    /// Source URL.
    pub url: String,
    /// Title of the page the link came from.
    pub title: String,
    /// The final error.
    pub error: DownloadError,
    /// Total attempts made.
    pub attempts: u32,
}

/// A mirror-hosted link surfaced for the user to download manually.
#[derive(Debug)]
pub struct ManualDownload {
    /// The raw mirror URL.
    pub url: String,
    /// Title of the page the link came from.
    pub title: String,
}

/// A direct link declined at the confirmation gate.
#[derive(Debug)]
pub struct SkippedDownload {
    /// Source URL.
    pub url: String,
    /// Title of the page the link came from.
    pub title: String,
}

/// Outcome of one batch run, one entry per input link.
///
/// Failures are reported per item rather than aborting the batch, so the
/// caller (and the test suite) can assert on exact failure counts.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successfully published downloads, in dispatch order.
    pub completed: Vec<CompletedDownload>,
    /// Downloads that failed after retries, in dispatch order.
    pub failed: Vec<FailedDownload>,
    /// Mirror links requiring manual action.
    pub manual: Vec<ManualDownload>,
    /// Links declined at the confirmation gate.
    pub skipped: Vec<SkippedDownload>,
}

impl BatchReport {
    /// Total number of links the batch handled.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.manual.len() + self.skipped.len()
    }
}

/// Download engine for concurrent file downloads with retry support.
///
/// # Concurrency Model
///
/// - Each direct download runs in its own Tokio task
/// - A semaphore permit is acquired before starting each download
/// - Permits are released automatically when downloads complete (RAII)
/// - Mirror handling and the confirmation gate run on the dispatch loop,
///   so interactive prompts appear one at a time and in link order
///
/// # Retry Behavior
///
/// - Transient errors (network issues, 5xx, 429) are retried with
///   exponential backoff; each retry streams into a fresh scratch file
/// - Permanent errors (404, 400, local IO) fail immediately without retry
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Retry policy for failed downloads.
    retry_policy: RetryPolicy,
    /// Staging directory for in-flight downloads.
    scratch_dir: PathBuf,
    /// Optional per-item confirmation gate.
    confirm_gate: Option<Arc<dyn ConfirmGate>>,
    /// Optional per-task progress hook.
    progress: Option<Arc<ProgressFactory>>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("concurrency", &self.concurrency)
            .field("scratch_dir", &self.scratch_dir)
            .field("confirm_gate", &self.confirm_gate.is_some())
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates a new download engine with the specified concurrency limit
    /// and retry policy. The scratch directory defaults to the OS temp
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_retries = retry_policy.max_attempts(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            scratch_dir: std::env::temp_dir(),
            confirm_gate: None,
            progress: None,
        })
    }

    /// Overrides the scratch directory used to stage in-flight downloads.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Installs a per-item confirmation gate.
    #[must_use]
    pub fn with_confirm_gate(mut self, gate: Arc<dyn ConfirmGate>) -> Self {
        self.confirm_gate = Some(gate);
        self
    }

    /// Installs a per-task progress hook.
    #[must_use]
    pub fn with_progress(mut self, factory: Arc<ProgressFactory>) -> Self {
        self.progress = Some(factory);
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Processes the resolved link map, downloading every direct link and
    /// collecting mirror links as manual instructions.
    ///
    /// Individual download failures do NOT cause this method to error; each
    /// is reported in the returned [`BatchReport`] alongside the successes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, client, links), fields(output_dir = %output_dir.display(), links = links.len()))]
    pub async fn run_batch(
        &self,
        client: &HttpClient,
        links: &OrderedMap<DownloadLink>,
        output_dir: &Path,
    ) -> Result<BatchReport, EngineError> {
        let mut report = BatchReport::default();
        let mut handles = Vec::new();

        info!("starting download batch");

        for (_key, link) in links {
            if link.origin == OriginKind::Mirror {
                info!(url = %link.url, title = %link.title, "mirror link, manual download required");
                report.manual.push(ManualDownload {
                    url: link.url.clone(),
                    title: link.title.clone(),
                });
                continue;
            }

            if let Some(gate) = &self.confirm_gate
                && !gate.confirm(link)
            {
                debug!(url = %link.url, "skipped at confirmation gate");
                report.skipped.push(SkippedDownload {
                    url: link.url.clone(),
                    title: link.title.clone(),
                });
                continue;
            }

            // Acquire semaphore permit (blocks if at concurrency limit)
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let client = client.clone();
            let url = link.url.clone();
            let title = link.title.clone();
            let output_dir = output_dir.to_path_buf();
            let scratch_dir = self.scratch_dir.clone();
            let retry_policy = self.retry_policy.clone();
            let progress_fn = self.progress.as_deref().map(|factory| factory(link));

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;

                let result = download_with_retry(
                    &client,
                    &url,
                    &output_dir,
                    &scratch_dir,
                    &retry_policy,
                    progress_fn.as_deref(),
                )
                .await;

                (url, title, result)
            }));
        }

        debug!(
            task_count = handles.len(),
            "waiting for downloads to complete"
        );

        for handle in handles {
            match handle.await {
                Ok((url, title, Ok(result))) => {
                    info!(url = %url, path = %result.path.display(), "download completed");
                    report.completed.push(CompletedDownload {
                        url,
                        title,
                        path: result.path,
                        bytes: result.bytes_downloaded,
                    });
                }
                Ok((url, title, Err((error, attempts)))) => {
                    warn!(
                        url = %url,
                        error = %error,
                        attempts,
                        "download failed after all attempts"
                    );
                    report.failed.push(FailedDownload {
                        url,
                        title,
                        error,
                        attempts,
                    });
                }
                // Task panics are logged but don't fail the batch.
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            manual = report.manual.len(),
            skipped = report.skipped.len(),
            "download batch complete"
        );

        Ok(report)
    }
}

/// Downloads a file with retry logic for transient errors.
///
/// Retry attempts are tracked in-memory during the retry loop. Only the
/// final error and attempt count are returned if all retries are exhausted.
#[instrument(skip_all, fields(url = %url))]
async fn download_with_retry(
    client: &HttpClient,
    url: &str,
    output_dir: &Path,
    scratch_dir: &Path,
    policy: &RetryPolicy,
    progress: Option<&(dyn Fn(u64, Option<u64>) + Send + Sync)>,
) -> Result<DownloadFileResult, (DownloadError, u32)> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting download");

        match client.fetch_to(url, output_dir, scratch_dir, progress).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let failure_type = classify_error(&e);

                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            url = %url,
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying download"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url = %url, %reason, "not retrying download");
                        return Err((e, attempt));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_retries() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20), 2.0)
    }

    fn direct(url: &str, title: &str) -> DownloadLink {
        DownloadLink::new(url, title, OriginKind::Direct)
    }

    fn link_map(links: Vec<DownloadLink>) -> OrderedMap<DownloadLink> {
        let mut map = OrderedMap::new();
        for link in links {
            map.insert(link.map_key(), link);
        }
        map
    }

    #[test]
    fn test_engine_new_valid_concurrency() {
        let engine = DownloadEngine::new(1, RetryPolicy::default()).unwrap();
        assert_eq!(engine.concurrency(), 1);

        let engine = DownloadEngine::new(100, RetryPolicy::default()).unwrap();
        assert_eq!(engine.concurrency(), 100);
    }

    #[test]
    fn test_engine_new_invalid_concurrency() {
        assert!(matches!(
            DownloadEngine::new(0, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            DownloadEngine::new(101, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_engine_stores_retry_policy() {
        let engine = DownloadEngine::new(4, RetryPolicy::with_max_attempts(5)).unwrap();
        assert_eq!(engine.retry_policy().max_attempts(), 5);
    }

    #[tokio::test]
    async fn test_batch_downloads_direct_links() {
        let mock_server = MockServer::start().await;
        let dest = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/a.cbz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"aaa"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.cbz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bbbb"))
            .mount(&mock_server)
            .await;

        let links = link_map(vec![
            direct(&format!("{}/a.cbz", mock_server.uri()), "Issue A"),
            direct(&format!("{}/b.cbz", mock_server.uri()), "Issue B"),
        ]);

        let engine = DownloadEngine::new(2, quick_retries())
            .unwrap()
            .with_scratch_dir(scratch.path());
        let client = HttpClient::new();

        let report = engine
            .run_batch(&client, &links, dest.path())
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.total(), 2);
        assert!(dest.path().join("a.cbz").exists());
        assert!(dest.path().join("b.cbz").exists());
    }

    #[tokio::test]
    async fn test_batch_mirror_link_is_not_fetched() {
        let mock_server = MockServer::start().await;
        let dest = TempDir::new().unwrap();

        // Any request to the mirror would trip this expectation.
        Mock::given(method("GET"))
            .and(path("/locker/file"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mirror_url = format!("{}/locker/file", mock_server.uri());
        let links = link_map(vec![DownloadLink::new(
            &mirror_url,
            "Mirror Issue",
            OriginKind::Mirror,
        )]);

        let engine = DownloadEngine::new(2, quick_retries()).unwrap();
        let client = HttpClient::new();

        let report = engine
            .run_batch(&client, &links, dest.path())
            .await
            .unwrap();

        assert_eq!(report.manual.len(), 1);
        assert_eq!(report.manual[0].url, mirror_url);
        assert_eq!(report.manual[0].title, "Mirror Issue");
        assert!(report.completed.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_batch_failure_isolated_to_single_task() {
        let mock_server = MockServer::start().await;
        let dest = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/gone.cbz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fine.cbz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .mount(&mock_server)
            .await;

        let links = link_map(vec![
            direct(&format!("{}/gone.cbz", mock_server.uri()), "Gone"),
            direct(&format!("{}/fine.cbz", mock_server.uri()), "Fine"),
        ]);

        let engine = DownloadEngine::new(2, quick_retries())
            .unwrap()
            .with_scratch_dir(scratch.path());
        let client = HttpClient::new();

        let report = engine
            .run_batch(&client, &links, dest.path())
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].attempts, 1, "404 must not be retried");
        assert!(matches!(
            report.failed[0].error,
            DownloadError::HttpStatus { status: 404, .. }
        ));
        assert!(dest.path().join("fine.cbz").exists());
        assert!(!dest.path().join("gone.cbz").exists());
    }

    #[tokio::test]
    async fn test_batch_retries_transient_failure() {
        let mock_server = MockServer::start().await;
        let dest = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();

        // First response is a 503, afterwards the file is served.
        Mock::given(method("GET"))
            .and(path("/flaky.cbz"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky.cbz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"recovered"))
            .mount(&mock_server)
            .await;

        let links = link_map(vec![direct(
            &format!("{}/flaky.cbz", mock_server.uri()),
            "Flaky",
        )]);

        let engine = DownloadEngine::new(1, quick_retries())
            .unwrap()
            .with_scratch_dir(scratch.path());
        let client = HttpClient::new();

        let report = engine
            .run_batch(&client, &links, dest.path())
            .await
            .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(
            std::fs::read(dest.path().join("flaky.cbz")).unwrap(),
            b"recovered"
        );
    }

    #[tokio::test]
    async fn test_confirm_gate_decline_skips_without_error() {
        struct DeclineAll;
        impl ConfirmGate for DeclineAll {
            fn confirm(&self, _link: &DownloadLink) -> bool {
                false
            }
        }

        let mock_server = MockServer::start().await;
        let dest = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/declined.cbz"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let links = link_map(vec![direct(
            &format!("{}/declined.cbz", mock_server.uri()),
            "Declined",
        )]);

        let engine = DownloadEngine::new(2, quick_retries())
            .unwrap()
            .with_confirm_gate(Arc::new(DeclineAll));
        let client = HttpClient::new();

        let report = engine
            .run_batch(&client, &links, dest.path())
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.completed.is_empty());
        assert!(report.failed.is_empty());
    }
}
