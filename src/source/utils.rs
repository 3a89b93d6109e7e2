//! Shared utilities for extractor modules: static selectors and regexes,
//! link normalization, month/session helpers, and per-call link dedup.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::download::filename_from_url;
use crate::resource::ResourceDescriptor;

/// Compiles a regex at static init; panics on invalid pattern.
pub fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Compiles a CSS selector at static init; panics on invalid selector.
pub fn compile_static_selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid static selector '{css}': {e}"))
}

/// Four-digit exam year, 2000 through 2030. Matches inside file names too.
pub static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(20(?:[0-2]\d|30))"));

/// Full or abbreviated English month name.
pub static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile_static_regex(
        r"(?i)\b(January|Jan|February|Feb|March|Mar|April|Apr|May|June|Jun|July|Jul|August|Aug|September|Sept|Sep|October|Oct|November|Nov|December|Dec)\b",
    )
});

/// `_qp_12` / `_in_3` / `_sf_21` in Cambridge-style file names.
static PAPER_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)_(qp|in|sf)_(\d+)?"));

/// Any anchor with an `href`.
pub static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| compile_static_selector("a[href]"));

/// File extensions treated as downloadable documents.
pub const DOCUMENT_EXTENSIONS: [&str; 11] = [
    "pdf", "doc", "docx", "ppt", "pptx", "xls", "xlsx", "odt", "rtf", "zip", "mp3",
];

const MONTHS: [(&str, &str); 12] = [
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sep", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

/// Canonical month name for a full or abbreviated month, case-insensitive.
#[must_use]
pub fn full_month_name(value: &str) -> Option<&'static str> {
    let lower = value.trim().to_lowercase();
    MONTHS.iter().find_map(|(abbr, full)| {
        let full_lower = full.to_lowercase();
        let matches = lower == *abbr
            || lower == full_lower
            || (lower.len() >= 3 && full_lower.starts_with(&lower));
        matches.then_some(*full)
    })
}

/// Month number 1-12, or 0 for anything unrecognized (sorts oldest).
#[must_use]
pub fn month_number(value: &str) -> u32 {
    full_month_name(value)
        .and_then(|full| MONTHS.iter().position(|(_, name)| *name == full))
        .and_then(|index| u32::try_from(index + 1).ok())
        .unwrap_or(0)
}

/// First year-like match in `value`.
#[must_use]
pub fn extract_year(value: &str) -> Option<String> {
    YEAR_RE
        .captures(value)
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

/// Resolves `href` against `base`, keeping only http(s) links without fragments.
#[must_use]
pub fn absolutize_url(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Lowercased extension of the URL's last path segment.
#[must_use]
pub fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_lowercase())
}

/// True if the URL path ends in one of [`DOCUMENT_EXTENSIONS`].
#[must_use]
pub fn has_document_extension(url: &Url) -> bool {
    url_extension(url).is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Element text with whitespace runs collapsed to single spaces.
#[must_use]
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive substring test.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}

/// Paper type (`qp`, `in`, `sf`) and optional variant number from a file name.
#[must_use]
pub fn paper_marker(filename: &str) -> Option<(String, Option<String>)> {
    let caps = PAPER_MARKER_RE.captures(filename)?;
    let paper_type = caps.get(1)?.as_str().to_lowercase();
    let variant = caps.get(2).map(|m| m.as_str().to_string());
    Some((paper_type, variant))
}

/// Builds a descriptor whose suggested filename is the URL's last segment.
#[must_use]
pub fn descriptor_for(source_id: &str, page_url: &Url, resource_url: &Url) -> ResourceDescriptor {
    let filename = filename_from_url(resource_url).unwrap_or_default();
    ResourceDescriptor::new(source_id, page_url.as_str(), resource_url.as_str(), filename)
}

/// Collects descriptors, dropping repeats of a resource URL within one call.
#[derive(Debug, Default)]
pub struct LinkSet {
    seen: HashSet<String>,
    items: Vec<ResourceDescriptor>,
}

impl LinkSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `url` was already collected.
    #[must_use]
    pub fn contains(&self, url: &Url) -> bool {
        self.seen.contains(url.as_str())
    }

    /// Adds a descriptor; returns false if its URL was already present.
    pub fn push(&mut self, descriptor: ResourceDescriptor) -> bool {
        if !self.seen.insert(descriptor.resource_url().to_string()) {
            return false;
        }
        self.items.push(descriptor);
        true
    }

    /// Number of collected descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Collected descriptors in insertion order.
    #[must_use]
    pub fn into_vec(self) -> Vec<ResourceDescriptor> {
        self.items
    }
}
