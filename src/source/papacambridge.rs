//! PapaCambridge extractor.
//!
//! Navigation: home -> grade menu -> subject folders -> session folders
//! (merged, newest first) -> direct file links. Only question papers, inserts and
//! source files (`_qp_`, `_in_`, `_sf_`) are kept.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use super::page::{HttpSettings, PageFetcher, parse_base_url, parse_listing_url};
use super::utils::{
    LinkSet, absolutize_url, compile_static_regex, compile_static_selector, contains_ignore_case,
    descriptor_for, element_text, extract_year, full_month_name, month_number, paper_marker,
};
use super::{ExtractError, LinkExtractor, SourceQuery};
use crate::download::filename_from_url;
use crate::resource::{
    META_GRADE, META_PAPER_TYPE, META_PAPER_VARIANT, META_SESSION, META_SUBJECT,
    META_SUBJECT_CODE, META_YEAR, ResourceDescriptor,
};

pub(crate) const SOURCE_ID: &str = "papacambridge";
const DEFAULT_BASE_URL: &str = "https://pastpapers.papacambridge.com/";
const MAX_SESSIONS: usize = 16;

static GRADE_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector("ul.kt-right-submenu__nav li.kt-menu__item a.kt-menu__link")
});
static GRADE_LABEL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.kt-menu__link-text"));
static FOLDER_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector(
        "div.files-list-main div.kt-widget4__item.item-folder-type a.kt-widget4__title",
    )
});
static FOLDER_LABEL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("span.wraptext"));
static FILE_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    compile_static_selector(r#"div.kt-widget4__item a.badge.badge-info[href*="download_file.php?files="]"#)
});

static SUBJECT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(\d{4})(?:\s*-\s*([A-Za-z]+))?"));

/// Trailing `(0580)` or `(0444 - us)` on a subject folder label.
static CODE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"\s*\(\s*\d{4}[^)]*\)\s*$"));

/// `2023-May-June`, `2022 Oct Nov`, `2021-March`.
static SESSION_FOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)^(\d{4})((?:[\s\-]+(?:January|Jan|February|Feb|March|Mar|April|Apr|May|June|Jun|July|Jul|August|Aug|September|Sept|Sep|October|Oct|November|Nov|December|Dec)){1,2})$",
    )
});

/// One session folder on a subject page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionFolder {
    url: Url,
    year: String,
    /// Normalized month names joined by `-` (e.g. `May-June`).
    session: String,
    sort_key: (u32, u32),
    /// Code of the subject folder this session was listed under.
    subject_code: Option<String>,
}

/// A subject folder and the syllabus code in its label.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SubjectFolder {
    url: Url,
    code: Option<String>,
}

/// Extractor for `pastpapers.papacambridge.com`.
///
/// Query: `grade` (e.g. `IGCSE`, `A Level`) and `subject`, or `listingUrl`
/// of a subject or session page. `limit` is a hard cap.
pub struct PapaCambridgeExtractor {
    fetcher: PageFetcher,
    base_url: Url,
}

impl PapaCambridgeExtractor {
    /// Creates an extractor for the public site.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Configuration`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, ExtractError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates an extractor against a custom host.
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

    async fn find_subject_folders(
        &self,
        grade: &str,
        subject: &str,
    ) -> Result<Vec<SubjectFolder>, ExtractError> {
        let home = self.fetcher.fetch(&self.base_url).await?;
        let Some(grade_url) = find_grade_link(&home.body, &home.url, grade) else {
            warn!(grade, "grade not found in navigation menu");
            return Ok(Vec::new());
        };

        let grade_page = self.fetcher.fetch(&grade_url).await?;
        let folders = find_subject_folders(&grade_page.body, &grade_page.url, subject);
        if folders.is_empty() {
            warn!(subject, url = %grade_page.url, "subject folder not found");
        }
        Ok(folders)
    }
}

impl std::fmt::Debug for PapaCambridgeExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PapaCambridgeExtractor")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LinkExtractor for PapaCambridgeExtractor {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn description(&self) -> &str {
        "PapaCambridge Cambridge past papers (question papers, inserts, source files). Needs grade + subject, or listingUrl."
    }

    #[instrument(skip(self), fields(source = SOURCE_ID))]
    async fn extract(&self, query: &SourceQuery) -> Result<Vec<ResourceDescriptor>, ExtractError> {
        let folders = if let Some(listing) = query.listing_url() {
            vec![SubjectFolder {
                url: parse_listing_url(SOURCE_ID, listing)?,
                code: None,
            }]
        } else {
            let grade = query
                .grade()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "grade"))?;
            let subject = query
                .subject()
                .ok_or_else(|| ExtractError::missing_field(SOURCE_ID, "subject"))?;
            self.find_subject_folders(grade, subject).await?
        };
        if folders.is_empty() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        let mut landing: Option<(Url, String)> = None;
        for folder in &folders {
            let page = self.fetcher.fetch(&folder.url).await?;
            let found = parse_session_folders(&page.body, &page.url);

            // A listing URL may point straight at a session page.
            if found.is_empty() && query.listing_url().is_some() {
                sessions.push(SessionFolder {
                    url: page.url.clone(),
                    year: extract_year(page.url.path()).unwrap_or_default(),
                    session: String::new(),
                    sort_key: (0, 0),
                    subject_code: None,
                });
                landing = Some((page.url, page.body));
                continue;
            }
            sessions.extend(found.into_iter().map(|session| SessionFolder {
                subject_code: folder.code.clone(),
                ..session
            }));
        }
        let sessions = newest_sessions(sessions);
        if sessions.is_empty() {
            warn!(folders = folders.len(), "no session folders found");
            return Ok(Vec::new());
        }
        debug!(folders = folders.len(), sessions = sessions.len(), "session folders");

        let mut links = LinkSet::new();
        'sessions: for session in &sessions {
            let body = match &landing {
                Some((url, body)) if *url == session.url => body.clone(),
                _ => self.fetcher.fetch(&session.url).await?.body,
            };
            for file_url in parse_session_files(&body, &session.url) {
                if query.limit.is_some_and(|limit| links.len() >= limit) {
                    break 'sessions;
                }
                if links.contains(&file_url) {
                    continue;
                }
                let descriptor = describe_file(&session.url, &file_url, session, query);
                links.push(descriptor);
            }
        }

        debug!(count = links.len(), "extracted links");
        Ok(links.into_vec())
    }
}

fn describe_file(
    page_url: &Url,
    file_url: &Url,
    session: &SessionFolder,
    query: &SourceQuery,
) -> ResourceDescriptor {
    let mut descriptor = descriptor_for(SOURCE_ID, page_url, file_url)
        .with_metadata(META_YEAR, session.year.as_str())
        .with_metadata(META_SESSION, session.session.as_str());
    if let Some(grade) = query.grade() {
        descriptor = descriptor.with_metadata(META_GRADE, grade);
    }
    if let Some(subject) = query.subject() {
        descriptor = descriptor.with_metadata(META_SUBJECT, subject);
    }
    if let Some(code) = session.subject_code.as_deref() {
        descriptor = descriptor.with_metadata(META_SUBJECT_CODE, code);
    }
    if let Some((paper_type, variant)) =
        filename_from_url(file_url).and_then(|name| paper_marker(&name))
    {
        descriptor = descriptor.with_metadata(META_PAPER_TYPE, paper_type);
        if let Some(variant) = variant {
            descriptor = descriptor.with_metadata(META_PAPER_VARIANT, variant);
        }
    }
    descriptor
}

fn folder_label(anchor: ElementRef<'_>) -> String {
    anchor
        .select(&FOLDER_LABEL_SELECTOR)
        .next()
        .map_or_else(|| element_text(anchor), element_text)
}

fn find_grade_link(html: &str, page_url: &Url, grade: &str) -> Option<Url> {
    let document = Html::parse_document(html);
    let wanted = grade.trim().to_lowercase();
    let candidates: Vec<(String, &str)> = document
        .select(&GRADE_LINK_SELECTOR)
        .filter_map(|anchor| {
            let label = anchor
                .select(&GRADE_LABEL_SELECTOR)
                .next()
                .map(element_text)?
                .to_lowercase();
            Some((label, anchor.value().attr("href")?))
        })
        .collect();

    // Exact label wins over substring so "AS" does not pick "AS & A Level".
    candidates
        .iter()
        .find(|(label, _)| *label == wanted)
        .or_else(|| candidates.iter().find(|(label, _)| label.contains(&wanted)))
        .and_then(|(_, href)| absolutize_url(href, page_url))
}

/// Subject folders for `subject`, in page order.
///
/// Folders whose name (code stripped) starts with `subject` as whole words
/// are taken, so `Mathematics` matches `Mathematics (0580)` and
/// `Mathematics (US) (0444 - us)` but not `Additional Mathematics (0606)`.
/// Plain substring matches are used only when no folder qualifies that way.
fn find_subject_folders(html: &str, page_url: &Url, subject: &str) -> Vec<SubjectFolder> {
    let document = Html::parse_document(html);
    let candidates: Vec<(String, SubjectFolder)> = document
        .select(&FOLDER_LINK_SELECTOR)
        .filter_map(|anchor| {
            let label = folder_label(anchor);
            if !contains_ignore_case(&label, subject) {
                return None;
            }
            let url = absolutize_url(anchor.value().attr("href")?, page_url)?;
            let code = subject_code(&label);
            Some((label, SubjectFolder { url, code }))
        })
        .collect();

    let leading: Vec<SubjectFolder> = candidates
        .iter()
        .filter(|(label, _)| leads_with_subject(label, subject))
        .map(|(_, folder)| folder.clone())
        .collect();
    if leading.is_empty() {
        candidates.into_iter().map(|(_, folder)| folder).collect()
    } else {
        leading
    }
}

fn leads_with_subject(label: &str, subject: &str) -> bool {
    let name = CODE_SUFFIX_RE.replace(label.trim(), "").to_lowercase();
    let subject = subject.trim().to_lowercase();
    name.strip_prefix(&subject)
        .is_some_and(|rest| rest.chars().next().is_none_or(|c| !c.is_alphanumeric()))
}

/// Syllabus code from a folder label, e.g. `0444-US` or `0580`.
fn subject_code(label: &str) -> Option<String> {
    let caps = SUBJECT_CODE_RE.captures(label)?;
    let code = caps.get(1)?.as_str();
    Some(match caps.get(2) {
        Some(suffix) => format!("{code}-{}", suffix.as_str().to_uppercase()),
        None => code.to_string(),
    })
}

/// Session folders, newest first, capped at [`MAX_SESSIONS`].
fn parse_session_folders(html: &str, page_url: &Url) -> Vec<SessionFolder> {
    let document = Html::parse_document(html);
    let mut sessions: Vec<SessionFolder> = document
        .select(&FOLDER_LINK_SELECTOR)
        .filter_map(|anchor| {
            let label = folder_label(anchor);
            let caps = SESSION_FOLDER_RE.captures(label.trim())?;
            let year = caps.get(1)?.as_str().to_string();
            let months: Vec<&str> = caps
                .get(2)?
                .as_str()
                .split(|c: char| c.is_whitespace() || c == '-')
                .filter_map(full_month_name)
                .collect();
            let last_month = months.last().map_or(0, |m| month_number(m));
            let url = absolutize_url(anchor.value().attr("href")?, page_url)?;
            Some(SessionFolder {
                url,
                sort_key: (year.parse().unwrap_or(0), last_month),
                year,
                session: months.join("-"),
                subject_code: None,
            })
        })
        .collect();

    newest_sessions(sessions)
}

/// Newest first (stable for ties), one entry per URL, at most [`MAX_SESSIONS`].
fn newest_sessions(mut sessions: Vec<SessionFolder>) -> Vec<SessionFolder> {
    sessions.sort_by(|a, b| b.sort_key.cmp(&a.sort_key));
    let mut seen = HashSet::new();
    sessions.retain(|session| seen.insert(session.url.clone()));
    sessions.truncate(MAX_SESSIONS);
    sessions
}

/// Direct file URLs from a session page's download badges.
fn parse_session_files(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    document
        .select(&FILE_LINK_SELECTOR)
        .filter_map(|anchor| {
            let href = absolutize_url(anchor.value().attr("href")?, page_url)?;
            let direct = href
                .query_pairs()
                .find(|(key, _)| key == "files")
                .map(|(_, value)| value.into_owned())?;
            absolutize_url(&direct, page_url)
        })
        .filter(|url| {
            filename_from_url(url).is_some_and(|name| paper_marker(&name).is_some())
        })
        .collect()
}
