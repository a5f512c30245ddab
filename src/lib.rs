//! Comicfetch Core Library
//!
//! This library provides the core functionality for the comicfetch tool,
//! which searches a comic hosting site by keyword, resolves per-issue
//! download links and streams the files to disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`date`] - Heuristic date parsing for the "newer than" cutoff
//! - [`site`] - Site adapter: search-result and issue-page extraction
//! - [`search`] - Paginated page discovery with date-cutoff termination
//! - [`links`] - Download-link resolution with fixed source priority
//! - [`download`] - HTTP download engine with streaming support
//! - [`ordered`] - Insertion-ordered URL map shared by the pipeline

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod date;
pub mod download;
pub mod links;
pub mod ordered;
pub mod search;
pub mod site;

mod user_agent;

// Re-export commonly used types
pub use date::{DateError, resolve_date};
pub use download::{
    BatchReport, DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadEngine, DownloadError,
    EngineError, FailureType, HttpClient, RetryDecision, RetryPolicy, classify_error,
};
pub use links::{DownloadLink, LinkReport, OriginKind, resolve_links};
pub use ordered::OrderedMap;
pub use search::{DiscoveryReport, PageResult, SearchQuery, discover};
pub use site::{ExtractedLinks, SearchHit, Site, SiteError, getcomics::GetComicsSite};
