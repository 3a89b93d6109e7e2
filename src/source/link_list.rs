//! Generic extractor: every document link on one listing page.

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, instrument, warn};
use url::Url;

use super::page::{HttpSettings, PageFetcher, parse_listing_url};
use super::utils::{
    ANCHOR_SELECTOR, LinkSet, absolutize_url, contains_ignore_case, descriptor_for, element_text,
    extract_year, has_document_extension,
};
use super::{ExtractError, LinkExtractor, SourceQuery};
use crate::resource::{META_GRADE, META_LINK_TEXT, META_SUBJECT, META_YEAR, ResourceDescriptor};

pub(crate) const SOURCE_ID: &str = "link-list";

/// Extracts links with a document extension (pdf, docx, ...) from `listingUrl`.
///
/// An optional `subject` narrows results to links whose text or URL mentions it.
#[derive(Debug)]
pub struct LinkListExtractor {
    fetcher: PageFetcher,
}

impl LinkListExtractor {
    /// Creates the extractor.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, ExtractError> {
        Ok(Self {
            fetcher: PageFetcher::new(SOURCE_ID, settings)?,
        })
    }
}

#[async_trait]
impl LinkExtractor for LinkListExtractor {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn description(&self) -> &str {
        "Any web page: every link to a document file (pdf, doc, docx, ...). Needs listingUrl; subject optionally filters."
    }

    #[instrument(skip(self), fields(source = SOURCE_ID))]
    async fn extract(&self, query: &SourceQuery) -> Result<Vec<ResourceDescriptor>, ExtractError> {
        let listing = query
            .listing_url()
            .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "listingUrl"))?;
        let listing_url = parse_listing_url(SOURCE_ID, listing)?;

        let page = self.fetcher.fetch(&listing_url).await?;
        let mut links = LinkSet::new();
        for (url, text) in parse_document_links(&page.body, &page.url) {
            if query.limit.is_some_and(|limit| links.len() >= limit) {
                break;
            }
            if let Some(subject) = query.subject()
                && !contains_ignore_case(&text, subject)
                && !contains_ignore_case(url.as_str(), subject)
            {
                continue;
            }

            let mut descriptor = descriptor_for(SOURCE_ID, &page.url, &url)
                .with_metadata(META_LINK_TEXT, text);
            if let Some(year) = extract_year(url.path()) {
                descriptor = descriptor.with_metadata(META_YEAR, year);
            }
            if let Some(grade) = query.grade() {
                descriptor = descriptor.with_metadata(META_GRADE, grade);
            }
            if let Some(subject) = query.subject() {
                descriptor = descriptor.with_metadata(META_SUBJECT, subject);
            }
            links.push(descriptor);
        }

        if links.is_empty() {
            warn!(url = %page.url, "no document links found");
        }
        debug!(count = links.len(), "extracted links");
        Ok(links.into_vec())
    }
}

/// Document links and their anchor text, in page order.
fn parse_document_links(html: &str, page_url: &Url) -> Vec<(Url, String)> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| {
            let url = absolutize_url(anchor.value().attr("href")?, page_url)?;
            has_document_extension(&url).then(|| (url, element_text(anchor)))
        })
        .collect()
}
