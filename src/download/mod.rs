//! HTTP download engine for streaming files to disk.
//!
//! This module provides functionality for downloading files from HTTP/HTTPS
//! URLs with streaming support to handle large files efficiently.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Stage-then-publish protocol: bytes stream into a scratch-directory
//!   temporary file which is renamed onto the destination only on success
//! - Collision-free destination naming (` (N)` numeric suffix probing)
//! - Automatic retry with exponential backoff for transient failures
//! - Mirror links are surfaced as manual-download instructions, never fetched
//!
//! # Example
//!
//! ```no_run
//! use comicfetch_core::download::{DownloadEngine, HttpClient, RetryPolicy};
//! use comicfetch_core::links::{DownloadLink, OriginKind};
//! use comicfetch_core::ordered::OrderedMap;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut links = OrderedMap::new();
//! let link = DownloadLink::new(
//!     "https://example.com/issue-1.cbz",
//!     "Issue 1",
//!     OriginKind::Direct,
//! );
//! links.insert(link.map_key(), link);
//!
//! let client = HttpClient::new();
//! let engine = DownloadEngine::new(4, RetryPolicy::default())?;
//! let report = engine
//!     .run_batch(&client, &links, Path::new("./comics"))
//!     .await?;
//! println!("downloaded {}, failed {}", report.completed.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod filename;
mod retry;

pub use client::{DownloadFileResult, HttpClient};
pub use engine::{
    BatchReport, CompletedDownload, ConfirmGate, DEFAULT_CONCURRENCY, DownloadEngine, EngineError,
    FailedDownload, ManualDownload, ProgressFactory, SkippedDownload,
};
pub use error::DownloadError;
pub use filename::{sanitize_filename, uniquify};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
