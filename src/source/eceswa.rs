//! Eswatini examinations council extractor.
//!
//! Navigation: programmes index -> grade column -> subject page -> PDF links in
//! the past-papers tab. Links without a year in their path are ignored.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use super::page::{HttpSettings, PageFetcher, parse_base_url, parse_listing_url};
use super::utils::{
    ANCHOR_SELECTOR, LinkSet, absolutize_url, compile_static_selector, contains_ignore_case,
    descriptor_for, element_text, extract_year, url_extension,
};
use super::{ExtractError, LinkExtractor, SourceQuery};
use crate::resource::{META_GRADE, META_SUBJECT, META_YEAR, ResourceDescriptor};

pub(crate) const SOURCE_ID: &str = "eceswa";
const DEFAULT_BASE_URL: &str = "https://www.examscouncil.org.sz/";
const INDEX_PATH: &str = "index.php";

static GRADE_COLUMN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("div.container-fluid.pl-5.pr-5 div.col-sm-3"));
static GRADE_TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("h6.border strong"));
static SUBJECT_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a.dropdown-item[href]"));
static PAST_PAPERS_SECTION_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("section#tab3"));

/// Extractor for `examscouncil.org.sz` subject pages.
///
/// Query: `grade` (e.g. `EGCSE`, `JC`) and `subject`, or `listingUrl` of a
/// subject page. `limit` is applied on a year boundary: once reached, the
/// year in progress is still completed.
pub struct EceswaExtractor {
    fetcher: PageFetcher,
    base_url: Url,
}

impl EceswaExtractor {
    /// Creates an extractor for the public site.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, ExtractError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates an extractor against a custom host (mirrors, tests).
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] for an invalid base URL or client failure.
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            fetcher: PageFetcher::new(SOURCE_ID, settings)?,
            base_url: parse_base_url(SOURCE_ID, base_url)?,
        })
    }

    async fn find_subject_page(&self, grade: &str, subject: &str) -> Result<Option<Url>, ExtractError> {
        let index_url = self
            .base_url
            .join(INDEX_PATH)
            .map_err(|e| ExtractError::configuration(SOURCE_ID, e.to_string()))?;
        let page = self.fetcher.fetch(&index_url).await?;
        Ok(find_subject_link(&page.body, &page.url, grade, subject))
    }
}

impl std::fmt::Debug for EceswaExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EceswaExtractor")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkExtractor for EceswaExtractor {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn description(&self) -> &str {
        "Eswatini Examinations Council past papers (JC, EGCSE). Needs grade + subject, or listingUrl of a subject page."
    }

    #[instrument(skip(self), fields(source = SOURCE_ID))]
    async fn extract(&self, query: &SourceQuery) -> Result<Vec<ResourceDescriptor>, ExtractError> {
        let subject_url = if let Some(listing) = query.listing_url() {
            parse_listing_url(SOURCE_ID, listing)?
        } else {
            let grade = query
                .grade()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "grade"))?;
            let subject = query
                .subject()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "subject"))?;
            let Some(url) = self.find_subject_page(grade, subject).await? else {
                warn!(grade, subject, "no matching subject on programmes index");
                return Ok(Vec::new());
            };
            url
        };

        let page = self.fetcher.fetch(&subject_url).await?;
        let papers = parse_subject_page(&page.body, &page.url);
        if papers.is_empty() {
            warn!(url = %page.url, "subject page has no recognizable paper links");
            return Ok(Vec::new());
        }

        let mut links = LinkSet::new();
        let mut current_year: Option<String> = None;
        for (url, year) in papers {
            if links.contains(&url) {
                continue;
            }
            let limit_reached = query.limit.is_some_and(|limit| links.len() >= limit);
            if limit_reached && current_year.as_deref() != Some(year.as_str()) {
                break;
            }
            current_year = Some(year.clone());

            let mut descriptor = descriptor_for(SOURCE_ID, &page.url, &url).with_metadata(META_YEAR, year);
            if let Some(grade) = query.grade() {
                descriptor = descriptor.with_metadata(META_GRADE, grade);
            }
            if let Some(subject) = query.subject() {
                descriptor = descriptor.with_metadata(META_SUBJECT, subject);
            }
            links.push(descriptor);
        }

        debug!(count = links.len(), "extracted links");
        Ok(links.into_vec())
    }
}

/// Finds the subject link inside the column whose title mentions `grade`.
fn find_subject_link(html: &str, page_url: &Url, grade: &str, subject: &str) -> Option<Url> {
    let document = Html::parse_document(html);
    let column = document.select(&GRADE_COLUMN_SELECTOR).find(|column| {
        column
            .select(&GRADE_TITLE_SELECTOR)
            .next()
            .is_some_and(|title| contains_ignore_case(&element_text(title), grade))
    })?;

    column
        .select(&SUBJECT_LINK_SELECTOR)
        .filter(|anchor| contains_ignore_case(&element_text(*anchor), subject))
        .find_map(|anchor| absolutize_url(anchor.value().attr("href")?, page_url))
}

/// PDF links in the past-papers tab, each paired with the year in its path.
fn parse_subject_page(html: &str, page_url: &Url) -> Vec<(Url, String)> {
    let document = Html::parse_document(html);
    let Some(section) = document.select(&PAST_PAPERS_SECTION_SELECTOR).next() else {
        return Vec::new();
    };

    section
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| absolutize_url(anchor.value().attr("href")?, page_url))
        .filter(|url| url_extension(url).as_deref() == Some("pdf"))
        .filter_map(|url| {
            let year = extract_year(url.path())?;
            Some((url, year))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const INDEX_HTML: &str = r#"
        <div class="container-fluid pl-5 pr-5">
          <div class="row">
            <div class="col-sm-3">
              <h6 class="border"><strong>Junior Certificate (JC)</strong></h6>
              <a class="dropdown-item" href="jc/maths.php">Mathematics (101)</a>
            </div>
            <div class="col-sm-3">
              <h6 class="border"><strong>Eswatini General Certificate of Secondary Education (EGCSE)</strong></h6>
              <a class="dropdown-item" href="egcse/english.php">English Language (6876)</a>
              <a class="dropdown-item" href="egcse/maths.php">Mathematics (6880)</a>
            </div>
          </div>
        </div>"#;

    const SUBJECT_HTML: &str = r#"
        <section id="tab1" class="tab-content"><a href="/syllabus/2023.pdf">Syllabus</a></section>
        <section id="tab3" class="tab-content">
          <a href="/papers/EGCSE2023Maths-P1.pdf">P1</a>
          <a href="/papers/EGCSE2023Maths-P2.PDF">P2</a>
          <a href="/papers/EGCSE2022Maths-P1.pdf">P1</a>
          <a href="/papers/Maths-specimen.pdf">Specimen</a>
          <a href="/papers/EGCSE2021Maths-P1.mp3">Audio</a>
        </section>"#;

    #[test]
    fn test_find_subject_link_matches_grade_column() {
        let base = Url::parse("https://eceswa.test/index.php").unwrap();
        let url = find_subject_link(INDEX_HTML, &base, "EGCSE", "mathematics").unwrap();
        assert_eq!(url.as_str(), "https://eceswa.test/egcse/maths.php");

        let url = find_subject_link(INDEX_HTML, &base, "JC", "Mathematics").unwrap();
        assert_eq!(url.as_str(), "https://eceswa.test/jc/maths.php");
    }

    #[test]
    fn test_find_subject_link_none_for_unknown_subject() {
        let base = Url::parse("https://eceswa.test/index.php").unwrap();
        assert!(find_subject_link(INDEX_HTML, &base, "EGCSE", "Physics").is_none());
        assert!(find_subject_link(INDEX_HTML, &base, "IGCSE", "Mathematics").is_none());
    }

    #[test]
    fn test_parse_subject_page_keeps_dated_pdfs_in_tab3() {
        let base = Url::parse("https://eceswa.test/egcse/maths.php").unwrap();
        let papers = parse_subject_page(SUBJECT_HTML, &base);
        let years: Vec<_> = papers.iter().map(|(_, y)| y.as_str()).collect();
        assert_eq!(years, vec!["2023", "2023", "2022"]);
        assert_eq!(
            papers[0].0.as_str(),
            "https://eceswa.test/papers/EGCSE2023Maths-P1.pdf"
        );
    }

    #[test]
    fn test_parse_subject_page_without_section_is_empty() {
        let base = Url::parse("https://eceswa.test/").unwrap();
        assert!(parse_subject_page("<html><body>moved</body></html>", &base).is_empty());
    }
}
