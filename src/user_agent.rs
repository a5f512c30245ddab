//! Shared User-Agent string for search and download HTTP clients.
//!
//! Single source for project URL and UA format so search and download traffic
//! stay consistent and easy to update (good citizenship; RFC 9308).

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/comicfetch";

/// Default User-Agent for all outbound requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("comicfetch/{version} (comic-archival-tool; +{PROJECT_UA_URL})")
}
