//! Shared User-Agent strings for page and file requests.
//!
//! Single source for project URL and UA format so scrape and fetch traffic
//! stay consistent and easy to update.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/paperfetch";

/// Default User-Agent for every outbound request (identifies the tool).
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("paperfetch/{version} (past-paper-fetcher; +{PROJECT_UA_URL})")
}

/// Browser-like `Accept` header sent with listing-page requests.
pub(crate) const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
