//! Concrete site adapter for the GetComics hosting site.
//!
//! Knows the search-page URL shape (`/page/<n>?s=<term>`) and the markup of
//! result lists and issue pages. Selectors are compiled once; anything the
//! markup does not offer (a missing date, a linkless result) degrades to
//! `None` rather than failing the page.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use super::{ExtractedLinks, SearchHit, Site, SiteError};
use crate::date::resolve_date;
use crate::user_agent;

const DEFAULT_BASE_URL: &str = "https://getcomics.info";

/// Connect timeout for site page fetches (seconds).
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Read timeout for site page fetches (seconds). Pages are small HTML
/// documents, so this is much shorter than the download read timeout.
const READ_TIMEOUT_SECS: u64 = 60;

static POST: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("article"));
static TITLE_LINK: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("h1.post-title a"));
static POST_TIME: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("time"));
static NATIVE_DOWNLOAD: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[title="Download Now"]"#));
static MIRROR_DOWNLOAD: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[title="MEDIAFIRE"]"#));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| compile_static_selector("a"));

/// Anchor text identifying a main-server download link.
const MAIN_SERVER_LABEL: &str = "Main Server";

#[allow(clippy::expect_used)]
fn compile_static_selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must compile")
}

/// Site adapter for GetComics.
pub struct GetComicsSite {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for GetComicsSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetComicsSite")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GetComicsSite {
    /// Creates the adapter against the production base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] when HTTP client construction fails.
    pub fn new() -> Result<Self, SiteError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates the adapter against a custom base URL (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`SiteError`] when the base URL is invalid or HTTP client
    /// construction fails.
    pub fn with_base_url(base_url: &str) -> Result<Self, SiteError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SiteError::parse(base_url, format!("invalid base URL: {e}")))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|e| SiteError::network(base_url.as_str(), e))?;

        Ok(Self { client, base_url })
    }

    /// Builds the search URL for one result page: `/page/<n>?s=<term>`.
    fn search_url(&self, term: &str, page: u32) -> Result<Url, SiteError> {
        let mut url = self
            .base_url
            .join(&format!("page/{page}"))
            .map_err(|e| SiteError::parse(self.base_url.as_str(), e.to_string()))?;
        url.query_pairs_mut().append_pair("s", term);
        Ok(url)
    }

    /// Fetches `url` and returns its body, mapping transport failures onto
    /// the site error taxonomy.
    async fn fetch_document(&self, url: &str) -> Result<String, SiteError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SiteError::timeout(url)
            } else {
                SiteError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteError::http_status(url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| SiteError::network(url, e))
    }
}

#[async_trait]
impl Site for GetComicsSite {
    fn name(&self) -> &'static str {
        "getcomics"
    }

    #[instrument(skip(self), fields(site = "getcomics"))]
    async fn search_page(&self, term: &str, page: u32) -> Result<Vec<SearchHit>, SiteError> {
        let url = self.search_url(term, page)?;
        debug!(url = %url, "fetching search page");
        let html = self.fetch_document(url.as_str()).await?;
        Ok(parse_search_results(&html, &self.base_url))
    }

    #[instrument(skip(self), fields(site = "getcomics"))]
    async fn issue_links(&self, page_url: &str) -> Result<ExtractedLinks, SiteError> {
        debug!(url = %page_url, "fetching issue page");
        let html = self.fetch_document(page_url).await?;
        Ok(parse_issue_links(&html, &self.base_url))
    }
}

/// Extracts (link, title, date) triples from a search-results document.
///
/// Each result lives in an `article` whose `h1.post-title` anchors carry the
/// page link and title; a `time` element carries the publish date when
/// present.
fn parse_search_results(html: &str, base: &Url) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for post in document.select(&POST) {
        let published_on = post.select(&POST_TIME).next().and_then(parse_post_date);

        for anchor in post.select(&TITLE_LINK) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let title = anchor.text().collect::<String>().trim().to_string();
            hits.push(SearchHit {
                url: absolutize(base, href),
                title,
                published_on,
            });
        }
    }

    hits
}

/// Extracts the grouped download links from an issue-page document.
fn parse_issue_links(html: &str, base: &Url) -> ExtractedLinks {
    let document = Html::parse_document(html);

    let native = document
        .select(&NATIVE_DOWNLOAD)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| absolutize(base, href));

    let main_servers = document
        .select(&ANCHOR)
        .filter(|a| a.text().collect::<String>().trim() == MAIN_SERVER_LABEL)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| absolutize(base, href))
        .collect();

    let mirror = document
        .select(&MIRROR_DOWNLOAD)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| absolutize(base, href));

    ExtractedLinks {
        native,
        main_servers,
        mirror,
    }
}

/// Reads a publish date from a `time` element.
///
/// Prefers the `datetime` attribute (ISO, possibly with a time suffix), then
/// the site's visible "Month day, year" format, then the heuristic resolver
/// for anything else the markup might hold.
fn parse_post_date(element: ElementRef<'_>) -> Option<NaiveDate> {
    if let Some(datetime) = element.value().attr("datetime") {
        let date_part = datetime.get(..10).unwrap_or(datetime);
        if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
            return Some(date);
        }
    }

    let text = element.text().collect::<String>();
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%B %d, %Y") {
        return Some(date);
    }

    // The heuristic resolver tokenizes on separators; commas would stick to
    // the day number.
    resolve_date(text.replace(',', " ").trim()).ok()
}

/// Resolves `href` against the site base; already-absolute links pass
/// through unchanged.
fn absolutize(base: &Url, href: &str) -> String {
    base.join(href)
        .map_or_else(|_| href.to_string(), Into::into)
}
