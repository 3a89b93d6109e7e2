//! Shared listing-page fetching for extractors.
//!
//! Centralizes networking defaults so every adapter sends the same
//! user-agent, `Accept` header, compression and timeouts.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use tracing::debug;
use url::Url;

use super::ExtractError;
use crate::download::constants::{CONNECT_TIMEOUT, PAGE_TIMEOUT};
use crate::user_agent::{HTML_ACCEPT, default_user_agent};

/// HTTP settings shared by every extractor's client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// `User-Agent` header value.
    pub user_agent: String,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout for one page.
    pub page_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: CONNECT_TIMEOUT,
            page_timeout: PAGE_TIMEOUT,
        }
    }
}

/// A fetched page: the URL after redirects plus the body text.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL, used as the base for relative links.
    pub url: Url,
    /// Response body.
    pub body: String,
}

/// Fetches listing pages for one source.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    source_id: &'static str,
    client: Client,
}

impl PageFetcher {
    /// Builds a fetcher for `source_id` with the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] if the client cannot be built.
    pub fn new(source_id: &'static str, settings: &HttpSettings) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.page_timeout)
            .gzip(true)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| ExtractError::configuration(source_id, format!("HTTP client: {e}")))?;
        Ok(Self { source_id, client })
    }

    /// GETs `url` and returns its body.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::SourceUnavailable`] on transport errors and
    /// non-success statuses.
    #[tracing::instrument(skip(self), fields(source = self.source_id))]
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, ExtractError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| ExtractError::transport(self.source_id, url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::http_status(
                self.source_id,
                url.as_str(),
                status.as_u16(),
            ));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| ExtractError::transport(self.source_id, url.as_str(), e.to_string()))?;
        debug!(url = %final_url, bytes = body.len(), "fetched page");

        Ok(FetchedPage {
            url: final_url,
            body,
        })
    }
}

/// Parses a configured base URL, forcing a trailing slash so joins stay below it.
///
/// # Errors
///
/// Returns [`ExtractError::Configuration`] for unparseable or non-http(s) URLs.
pub fn parse_base_url(source_id: &str, base_url: &str) -> Result<Url, ExtractError> {
    let mut normalized = base_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized)
        .map_err(|e| ExtractError::configuration(source_id, format!("base URL '{base_url}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractError::configuration(
            source_id,
            format!("base URL '{base_url}' must be http or https"),
        ));
    }
    Ok(url)
}

/// Parses a caller-supplied listing URL.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidQuery`] for unparseable or non-http(s) URLs.
pub fn parse_listing_url(source_id: &str, listing_url: &str) -> Result<Url, ExtractError> {
    let url = Url::parse(listing_url.trim()).map_err(|e| {
        ExtractError::invalid_query(source_id, format!("listingUrl '{listing_url}': {e}"))
    })?;
    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(ExtractError::invalid_query(
            source_id,
            format!("listingUrl '{listing_url}' must be http or https"),
        ))
    }
}
