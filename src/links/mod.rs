//! Download-link resolution with fixed source priority.
//!
//! Each discovered page is visited once and its best available download
//! link extracted. Sources are mutually exclusive per page, first match
//! wins:
//!
//! 1. the designated native download link (one direct entry),
//! 2. any number of "main server" links (one direct entry each),
//! 3. a third-party mirror link (one mirror entry, surfaced to the user
//!    instead of fetched),
//! 4. nothing - the page is reported as yielding no links.

use tracing::{debug, info, instrument, warn};

use crate::ordered::OrderedMap;
use crate::search::PageResult;
use crate::site::{Site, SiteError};

/// Marker prefixed onto the map key of mirror entries, so downstream logic
/// can recognize them without re-inspecting the link itself.
pub const MIRROR_KEY_MARKER: &str = "_MIRROR_";

/// Where a download link points, which decides how the engine treats it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginKind {
    /// Fetchable by the engine via a streaming HTTP GET.
    Direct,
    /// Hosted on a third-party file locker; surfaced, never fetched.
    Mirror,
}

/// A resolved download link carrying the title of its originating page.
#[derive(Debug, Clone)]
pub struct DownloadLink {
    /// The download URL.
    pub url: String,
    /// Title of the page the link was found on.
    pub title: String,
    /// Whether the engine can fetch this link itself.
    pub origin: OriginKind,
}

impl DownloadLink {
    /// Creates a new download link.
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, origin: OriginKind) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            origin,
        }
    }

    /// The key this link is stored under in the resolved link map.
    ///
    /// Mirror links are prefixed with [`MIRROR_KEY_MARKER`]; direct links
    /// use the URL unchanged.
    #[must_use]
    pub fn map_key(&self) -> String {
        match self.origin {
            OriginKind::Direct => self.url.clone(),
            OriginKind::Mirror => format!("{MIRROR_KEY_MARKER}{}", self.url),
        }
    }
}

/// A page whose link extraction failed.
#[derive(Debug)]
pub struct FailedPage {
    /// The page URL that could not be processed.
    pub url: String,
    /// What went wrong.
    pub error: SiteError,
}

/// Outcome of resolving links for a batch of discovered pages.
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Resolved links keyed by [`DownloadLink::map_key`], in page order.
    pub links: OrderedMap<DownloadLink>,
    /// Pages that failed to fetch or parse; the batch continued past them.
    pub failed_pages: Vec<FailedPage>,
    /// Pages that yielded no recognizable download link.
    pub empty_pages: Vec<String>,
}

/// Visits each discovered page and extracts its best download link.
///
/// Fails soft per page: a fetch or parse error is recorded in the report
/// and resolution continues with the next page. Duplicate URLs across pages
/// collapse to the first entry.
#[instrument(skip_all, fields(pages = pages.len()))]
pub async fn resolve_links(
    site: &dyn Site,
    pages: &OrderedMap<PageResult>,
) -> LinkReport {
    let mut report = LinkReport::default();

    for (url, page) in pages {
        debug!(url, "resolving download links");

        let extracted = match site.issue_links(url).await {
            Ok(extracted) => extracted,
            Err(error) => {
                warn!(url, error = %error, "skipping page after extraction error");
                report.failed_pages.push(FailedPage {
                    url: url.to_string(),
                    error,
                });
                continue;
            }
        };

        if let Some(native) = extracted.native {
            let link = DownloadLink::new(native, &page.title, OriginKind::Direct);
            report.links.insert(link.map_key(), link);
        } else if !extracted.main_servers.is_empty() {
            for server in extracted.main_servers {
                let link = DownloadLink::new(server, &page.title, OriginKind::Direct);
                report.links.insert(link.map_key(), link);
            }
        } else if let Some(mirror) = extracted.mirror {
            info!(url, mirror = %mirror, "only a mirror link available");
            let link = DownloadLink::new(mirror, &page.title, OriginKind::Mirror);
            report.links.insert(link.map_key(), link);
        } else {
            debug!(url, "no download links found");
            report.empty_pages.push(url.to_string());
        }
    }

    info!(
        links = report.links.len(),
        failed = report.failed_pages.len(),
        empty = report.empty_pages.len(),
        "link resolution complete"
    );

    report
}
