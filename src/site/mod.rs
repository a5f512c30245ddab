//! Site adapter: the narrow interface between the pipeline and the comic
//! hosting site's markup.
//!
//! The discovery and link-resolution pipeline only needs two capabilities:
//! fetch one page of search results, and extract the download links from one
//! issue page. Everything site-specific (base URL, selectors, date markup)
//! lives behind the [`Site`] trait so the pipeline survives markup changes
//! and tests can substitute a canned implementation.

pub mod getcomics;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

/// One entry from a page of search results.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// URL of the hosting page for this result.
    pub url: String,
    /// Result title as displayed by the site.
    pub title: String,
    /// Publish date, when the site exposes one for the result.
    pub published_on: Option<NaiveDate>,
}

/// Download links found on a single issue page, grouped by source.
///
/// The groups map onto the fixed source priority applied during link
/// resolution; extraction itself is priority-agnostic.
#[derive(Debug, Clone, Default)]
pub struct ExtractedLinks {
    /// The designated native download link, if present.
    pub native: Option<String>,
    /// All "main server" links, in page order.
    pub main_servers: Vec<String>,
    /// A third-party mirror link, if present.
    pub mirror: Option<String>,
}

impl ExtractedLinks {
    /// Returns `true` if no link of any kind was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.native.is_none() && self.main_servers.is_empty() && self.mirror.is_none()
    }
}

/// Errors raised while talking to or reading the site.
#[derive(Debug, Error)]
pub enum SiteError {
    /// Network-level error (DNS resolution, connection refused, TLS, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The fetched document did not have the expected structure.
    #[error("parse error on {url}: {reason}")]
    Parse {
        /// The URL whose document could not be read.
        url: String,
        /// What was missing or malformed.
        reason: String,
    },
}

impl SiteError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a parse error.
    pub fn parse(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// The capability set the pipeline needs from a hosting site.
#[async_trait]
pub trait Site: Send + Sync {
    /// Short adapter name for logging.
    fn name(&self) -> &'static str;

    /// Fetches one page of search results for `term`.
    ///
    /// Page numbers start at 1. An empty vec signals result exhaustion.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] when the page cannot be fetched or read.
    async fn search_page(&self, term: &str, page: u32) -> Result<Vec<SearchHit>, SiteError>;

    /// Extracts the download links present on one issue page.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] when the page cannot be fetched or read.
    async fn issue_links(&self, page_url: &str) -> Result<ExtractedLinks, SiteError>;
}
