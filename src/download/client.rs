//! HTTP client wrapper for downloading files.
//!
//! This module provides the `HttpClient` struct which streams a resource
//! into a scratch-directory temporary file and atomically renames it onto
//! its final destination once the stream completes. A failed stream removes
//! the temporary file and never touches the destination path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::filename::{destination_name, uniquify};
use crate::user_agent;

/// Monotonic counter distinguishing scratch files of concurrent tasks that
/// happen to share a destination filename.
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Callback invoked per streamed chunk with (bytes so far, declared total).
///
/// The total is `None` when the server sends no Content-Length; the size is
/// then reported as unknown rather than estimated.
pub type ProgressFn<'a> = Option<&'a (dyn Fn(u64, Option<u64>) + Send + Sync)>;

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for multiple
/// downloads, taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Metadata describing a finished download.
#[derive(Debug, Clone)]
pub struct DownloadFileResult {
    /// Final published path.
    pub path: PathBuf,
    /// Bytes streamed to disk.
    pub bytes_downloaded: u64,
    /// Size declared by the server, when known.
    pub content_length: Option<u64>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 10 minutes (for large archives)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Downloads `url` into `dest_dir`, staging through `scratch_dir`.
    ///
    /// The destination filename is the URL's trailing path segment,
    /// percent-decoded, sanitized and made unique against `dest_dir`. Bytes
    /// stream into a temporary file under `scratch_dir`; only a complete
    /// stream is renamed onto the destination. `on_progress` is invoked per
    /// chunk with the byte count so far and the declared total size.
    ///
    /// If another file claims the destination path between the uniqueness
    /// probe and the rename, the rename still proceeds (last write wins).
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - Writing to the scratch file or renaming to the destination fails
    #[must_use = "download result contains the path to the downloaded file"]
    #[instrument(skip(self, on_progress), fields(url = %url))]
    pub async fn fetch_to(
        &self,
        url: &str,
        dest_dir: &Path,
        scratch_dir: &Path,
        on_progress: ProgressFn<'_>,
    ) -> Result<DownloadFileResult, DownloadError> {
        debug!("starting download");

        let parsed_url =
            Url::parse(url).map_err(|_| DownloadError::invalid_url(url.to_string()))?;

        let name = destination_name(&parsed_url);
        let dest_path = uniquify(&dest_dir.join(&name));
        debug!(path = %dest_path.display(), "resolved destination path");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let scratch_path = scratch_dir.join(format!(
            "{name}.{}.{}.part",
            std::process::id(),
            SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed),
        ));

        let file = File::create(&scratch_path)
            .await
            .map_err(|e| DownloadError::io(scratch_path.clone(), e))?;

        let stream_result =
            stream_to_file(file, response, url, &scratch_path, content_length, on_progress).await;

        let bytes_downloaded = match stream_result {
            Ok(bytes) => bytes,
            Err(e) => {
                // A failed stream must never surface at the destination.
                debug!(path = %scratch_path.display(), "removing scratch file after error");
                let _ = tokio::fs::remove_file(&scratch_path).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&scratch_path, &dest_path).await {
            let _ = tokio::fs::remove_file(&scratch_path).await;
            return Err(DownloadError::io(dest_path.clone(), e));
        }

        info!(
            path = %dest_path.display(),
            bytes = bytes_downloaded,
            "download complete"
        );

        Ok(DownloadFileResult {
            path: dest_path,
            bytes_downloaded,
            content_length,
        })
    }
}

/// Streams the response body into the scratch file, returning bytes written.
///
/// Takes ownership of the file handle so it is closed before the caller
/// renames the scratch file.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    scratch_path: &Path,
    content_length: Option<u64>,
    on_progress: ProgressFn<'_>,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(scratch_path.to_path_buf(), e))?;

        bytes_written += chunk.len() as u64;
        if let Some(progress) = on_progress {
            progress(bytes_written, content_length);
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(scratch_path.to_path_buf(), e))?;

    Ok(bytes_written)
}
