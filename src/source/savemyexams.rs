//! SaveMyExams extractor.
//!
//! Navigation: grade page -> subject block -> "Past Papers" resource -> past
//! papers table. `view.php?id=<path>.pdf` links are rewritten to the download
//! host without an extra request.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use super::page::{HttpSettings, PageFetcher, parse_base_url, parse_listing_url};
use super::utils::{
    LinkSet, MONTH_RE, absolutize_url, compile_static_selector, contains_ignore_case,
    descriptor_for, element_text, extract_year, full_month_name, month_number, paper_marker,
};
use super::{ExtractError, LinkExtractor, SourceQuery};
use crate::download::filename_from_url;
use crate::resource::{
    META_GRADE, META_PAPER_TYPE, META_SESSION, META_SUBJECT, META_YEAR, ResourceDescriptor,
};

pub(crate) const SOURCE_ID: &str = "savemyexams";
const DEFAULT_BASE_URL: &str = "https://www.savemyexams.com";
pub(crate) const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://pastpapers.co";

static SUBJECT_BLOCK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("main.py-5 div.Wrapper_wrapper__GnBU0"));
static SUBJECT_HEADING_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("h3.Subjects_subject__t5OCh"));
static RESOURCE_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a.ResourceLink_link__DBka0[href]"));
static RESOURCE_TEXT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.ResourceLink_text__36e8q"));
static TABLE_ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("table.PastPapersTable_table__NXbSW tbody tr"));
static PAST_PAPER_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector(r#"a[data-type="Past Paper"]"#));

/// Year and canonical month of one exam session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Session {
    year: u32,
    month: u32,
    month_name: &'static str,
}

/// Extractor for `savemyexams.com` past-paper tables.
///
/// Query: `grade` (e.g. `IGCSE`, `A-Level`) and `subject` (exact subject
/// heading), or `listingUrl` of a past-papers page. `limit` is applied per
/// whole session: the session that reaches it is still returned in full.
pub struct SaveMyExamsExtractor {
    fetcher: PageFetcher,
    base_url: Url,
    download_base: String,
}

impl SaveMyExamsExtractor {
    /// Creates an extractor for the public site.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, ExtractError> {
        Self::with_base_urls(settings, DEFAULT_BASE_URL, DEFAULT_DOWNLOAD_BASE_URL)
    }

    /// Creates an extractor against custom site and download hosts.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] for invalid URLs or client failure.
    pub fn with_base_urls(
        settings: &HttpSettings,
        base_url: &str,
        download_base_url: &str,
    ) -> Result<Self, ExtractError> {
        let download_base = parse_base_url(SOURCE_ID, download_base_url)?;
        Ok(Self {
            fetcher: PageFetcher::new(SOURCE_ID, settings)?,
            base_url: parse_base_url(SOURCE_ID, base_url)?,
            download_base: download_base.as_str().trim_end_matches('/').to_string(),
        })
    }

    async fn find_past_papers_page(
        &self,
        grade: &str,
        subject: &str,
    ) -> Result<Option<Url>, ExtractError> {
        let grade_url = self
            .base_url
            .join(&format!("{}/", grade.to_lowercase()))
            .map_err(|e| ExtractError::invalid_query(SOURCE_ID, format!("grade '{grade}': {e}")))?;
        let page = self.fetcher.fetch(&grade_url).await?;
        let url = find_past_papers_link(&page.body, &page.url, grade, subject);
        if url.is_none() {
            warn!(grade, subject, "past papers link not found on grade page");
        }
        Ok(url)
    }
}

impl std::fmt::Debug for SaveMyExamsExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveMyExamsExtractor")
            .field("base_url", &self.base_url.as_str())
            .field("download_base", &self.download_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkExtractor for SaveMyExamsExtractor {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn description(&self) -> &str {
        "SaveMyExams past paper tables (question papers and inserts). Needs grade + subject, or listingUrl."
    }

    #[instrument(skip(self), fields(source = SOURCE_ID))]
    async fn extract(&self, query: &SourceQuery) -> Result<Vec<ResourceDescriptor>, ExtractError> {
        let listing_url = if let Some(listing) = query.listing_url() {
            parse_listing_url(SOURCE_ID, listing)?
        } else {
            let grade = query
                .grade()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "grade"))?;
            let subject = query
                .subject()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "subject"))?;
            match self.find_past_papers_page(grade, subject).await? {
                Some(url) => url,
                None => return Ok(Vec::new()),
            }
        };

        let page = self.fetcher.fetch(&listing_url).await?;
        let sessions = parse_past_papers_table(&page.body, &page.url, &self.download_base);
        if sessions.is_empty() {
            warn!(url = %page.url, "past papers table missing or empty");
            return Ok(Vec::new());
        }

        let mut links = LinkSet::new();
        // BTreeMap iterates oldest first; newest sessions are wanted first.
        for (session, urls) in sessions.into_iter().rev() {
            if query.limit.is_some_and(|limit| links.len() >= limit) {
                break;
            }
            for url in urls {
                let mut descriptor = descriptor_for(SOURCE_ID, &page.url, &url)
                    .with_metadata(META_YEAR, session.year.to_string())
                    .with_metadata(META_SESSION, session.month_name);
                if let Some(grade) = query.grade() {
                    descriptor = descriptor.with_metadata(META_GRADE, grade);
                }
                if let Some(subject) = query.subject() {
                    descriptor = descriptor.with_metadata(META_SUBJECT, subject);
                }
                if let Some((paper_type, _)) =
                    filename_from_url(&url).and_then(|name| paper_marker(&name))
                {
                    descriptor = descriptor.with_metadata(META_PAPER_TYPE, paper_type);
                }
                links.push(descriptor);
            }
        }

        debug!(count = links.len(), "extracted links");
        Ok(links.into_vec())
    }
}

fn find_past_papers_link(html: &str, page_url: &Url, grade: &str, subject: &str) -> Option<Url> {
    let document = Html::parse_document(html);
    let grade = grade.trim().to_lowercase();
    let block = document.select(&SUBJECT_BLOCK_SELECTOR).find(|block| {
        block
            .select(&SUBJECT_HEADING_SELECTOR)
            .next()
            .is_some_and(|heading| element_text(heading).eq_ignore_ascii_case(subject.trim()))
    })?;

    block.select(&RESOURCE_LINK_SELECTOR).find_map(|anchor| {
        let text = anchor.select(&RESOURCE_TEXT_SELECTOR).next().map(element_text)?;
        let href = anchor.value().attr("href")?;
        if contains_ignore_case(&text, "past papers") && href.to_lowercase().contains(&grade) {
            absolutize_url(href, page_url)
        } else {
            None
        }
    })
}

/// Session of a table row: year and month from the first link mentioning both.
fn row_session(texts: &[String]) -> Option<Session> {
    texts.iter().find_map(|text| {
        let year = extract_year(text)?.parse().ok()?;
        let month_name = full_month_name(MONTH_RE.find(text)?.as_str())?;
        Some(Session {
            year,
            month: month_number(month_name),
            month_name,
        })
    })
}

/// Rewrites `view.php?id=<path>.pdf` to `<download_base>/<path>`; other
/// links pass through.
fn resolve_view_link(url: Url, download_base: &str) -> Option<Url> {
    if !url.path().ends_with("view.php") {
        return Some(url);
    }
    let id = url
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())?;
    if !id.to_lowercase().ends_with(".pdf") {
        return None;
    }
    Url::parse(&format!("{download_base}/{}", id.trim_start_matches('/'))).ok()
}

fn is_wanted_paper(href: &str) -> bool {
    let lower = href.to_lowercase();
    lower.ends_with(".pdf") && (lower.contains("_qp_") || lower.contains("_in_"))
}

/// Question paper and insert URLs grouped by session.
fn parse_past_papers_table(
    html: &str,
    page_url: &Url,
    download_base: &str,
) -> BTreeMap<Session, Vec<Url>> {
    let document = Html::parse_document(html);
    let mut sessions: BTreeMap<Session, Vec<Url>> = BTreeMap::new();

    for row in document.select(&TABLE_ROW_SELECTOR) {
        let anchors: Vec<_> = row.select(&PAST_PAPER_LINK_SELECTOR).collect();
        let texts: Vec<String> = anchors.iter().map(|a| element_text(*a)).collect();
        let Some(session) = row_session(&texts) else {
            continue;
        };

        let urls: Vec<Url> = anchors
            .iter()
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| is_wanted_paper(href))
            .filter_map(|href| absolutize_url(href, page_url))
            .filter_map(|url| resolve_view_link(url, download_base))
            .collect();
        if !urls.is_empty() {
            sessions.entry(session).or_default().extend(urls);
        }
    }
    sessions
}
