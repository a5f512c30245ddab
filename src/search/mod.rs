//! Paginated page discovery with date-cutoff early termination.
//!
//! Walks the site's search result pages in order, accumulating one
//! [`PageResult`] per distinct hosting page until the desired count is
//! reached, the results run out, or a date cutoff is crossed. Results are
//! assumed to arrive newest-first across all pages, so the first result
//! older than the cutoff ends discovery for the whole query - no later
//! result can satisfy it.

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::ordered::OrderedMap;
use crate::site::{Site, SiteError};

/// Consecutive page-fetch failures tolerated before discovery gives up.
///
/// A single bad page is skipped; a dead site should not spin forever.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

/// One search request: term, result cap and optional date cutoff.
///
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    term: String,
    desired_count: usize,
    date_cutoff: Option<NaiveDate>,
}

impl SearchQuery {
    /// Creates a query. A `desired_count` of 0 means unbounded.
    #[must_use]
    pub fn new(term: impl Into<String>, desired_count: usize, date_cutoff: Option<NaiveDate>) -> Self {
        Self {
            term: term.into(),
            desired_count,
            date_cutoff,
        }
    }

    /// The search term.
    #[must_use]
    pub fn term(&self) -> &str {
        &self.term
    }

    /// Maximum results to collect; 0 means unbounded.
    #[must_use]
    pub fn desired_count(&self) -> usize {
        self.desired_count
    }

    /// Results published before this date end discovery.
    #[must_use]
    pub fn date_cutoff(&self) -> Option<NaiveDate> {
        self.date_cutoff
    }

    fn is_full(&self, collected: usize) -> bool {
        self.desired_count > 0 && collected >= self.desired_count
    }
}

/// One discovered hosting page.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// URL of the hosting page (the map key).
    pub url: String,
    /// Result title as displayed by the site.
    pub title: String,
    /// Publish date, when the site exposed one.
    pub published_on: Option<NaiveDate>,
}

/// A search page whose fetch or parse failed; discovery continued past it.
#[derive(Debug)]
pub struct FailedSearchPage {
    /// The 1-based search page number.
    pub page_number: u32,
    /// What went wrong.
    pub error: SiteError,
}

/// Outcome of one discovery run.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Discovered pages keyed by URL, in the site's newest-first order.
    pub pages: OrderedMap<PageResult>,
    /// Search pages skipped after fetch/parse errors.
    pub failed_pages: Vec<FailedSearchPage>,
    /// Whether discovery ended because a result crossed the date cutoff.
    pub cutoff_hit: bool,
}

/// Walks search result pages for `query`, accumulating distinct hosting
/// pages.
///
/// Fails soft: an error on one search page is recorded and discovery moves
/// to the next page, unless [`MAX_CONSECUTIVE_PAGE_FAILURES`] pages fail in
/// a row. A page with zero results signals exhaustion. With a date cutoff
/// set, results are scanned in page order and the first one older than the
/// cutoff terminates discovery entirely - this is a stop condition, not a
/// filter. Results beyond the desired count are not added.
#[instrument(skip(site), fields(term = query.term(), desired = query.desired_count()))]
pub async fn discover(site: &dyn Site, query: &SearchQuery) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut consecutive_failures = 0u32;
    let mut page_number = 0u32;

    'pages: while !query.is_full(report.pages.len()) {
        page_number += 1;

        let hits = match site.search_page(query.term(), page_number).await {
            Ok(hits) => {
                consecutive_failures = 0;
                hits
            }
            Err(error) => {
                warn!(page_number, error = %error, "skipping search page after error");
                report.failed_pages.push(FailedSearchPage { page_number, error });
                consecutive_failures += 1;
                if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                    warn!(
                        failures = consecutive_failures,
                        "too many consecutive page failures, ending discovery"
                    );
                    break 'pages;
                }
                continue;
            }
        };

        if hits.is_empty() {
            debug!(page_number, "search results exhausted");
            break;
        }

        for hit in hits {
            if let (Some(cutoff), Some(published)) = (query.date_cutoff(), hit.published_on)
                && published < cutoff
            {
                debug!(
                    url = %hit.url,
                    published = %published,
                    cutoff = %cutoff,
                    "result older than cutoff, ending discovery"
                );
                report.cutoff_hit = true;
                break 'pages;
            }

            // Results past the cap are scanned for the cutoff but not kept.
            if query.is_full(report.pages.len()) {
                continue;
            }

            report.pages.insert(
                hit.url.clone(),
                PageResult {
                    url: hit.url,
                    title: hit.title,
                    published_on: hit.published_on,
                },
            );
        }
    }

    info!(
        pages = report.pages.len(),
        failed = report.failed_pages.len(),
        cutoff_hit = report.cutoff_hit,
        "page discovery complete"
    );

    report
}
