//! Filename sanitization and deterministic destination-path resolution.
//!
//! [`PathResolver`] maps descriptors to paths under a destination directory.
//! It never looks at the filesystem: the same batch always yields the same
//! mapping, so a re-run lands on the files written by the previous run.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resource::{META_GRADE, META_SESSION, META_SUBJECT, META_YEAR, ResourceDescriptor};

/// Name used when neither the descriptor nor its URL yields a usable filename.
pub const FALLBACK_FILENAME: &str = "download.bin";

/// Longest filename (in bytes) written to disk, extension included.
pub const MAX_FILENAME_BYTES: usize = 180;

/// How resolved files are laid out under the destination directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathLayout {
    /// Every file directly in the destination directory.
    #[default]
    Flat,
    /// `grade/subject/year/session/` folders built from descriptor metadata;
    /// absent metadata keys are left out of the path.
    BySession,
}

/// Destination decided for one batch position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPath {
    /// This position owns the path and will fetch into it.
    Claimed(PathBuf),
    /// Same `resource_url` as an earlier position; shares that position's result.
    DuplicateOf(usize),
}

/// Pure mapping from descriptors to collision-free destination paths.
#[derive(Debug, Clone)]
pub struct PathResolver {
    dest_dir: PathBuf,
    layout: PathLayout,
}

impl PathResolver {
    /// Creates a resolver rooted at `dest_dir`.
    #[must_use]
    pub fn new(dest_dir: impl Into<PathBuf>, layout: PathLayout) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            layout,
        }
    }

    /// Destination root.
    #[must_use]
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Base path for one descriptor, before any collision handling.
    #[must_use]
    pub fn resolve(&self, descriptor: &ResourceDescriptor) -> PathBuf {
        self.directory_for(descriptor)
            .join(filename_for(descriptor))
    }

    /// Resolves a whole batch.
    ///
    /// Positions sharing a `resource_url` become [`ResolvedPath::DuplicateOf`]
    /// the first one. Distinct resources whose paths collide
    /// (case-insensitively) get `_2`, `_3`, ... suffixes in first-seen order.
    /// A claimed path also reserves its [`part_path_for`] sibling, so no item
    /// can land on another item's in-progress file.
    #[must_use]
    pub fn resolve_batch(&self, descriptors: &[ResourceDescriptor]) -> Vec<ResolvedPath> {
        let mut first_by_url: HashMap<&str, usize> = HashMap::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut resolved = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            if let Some(&primary) = first_by_url.get(descriptor.resource_url()) {
                resolved.push(ResolvedPath::DuplicateOf(primary));
                continue;
            }
            first_by_url.insert(descriptor.resource_url(), index);

            let base = self.resolve(descriptor);
            let path = claim_unique(&base, &mut claimed);
            resolved.push(ResolvedPath::Claimed(path));
        }

        resolved
    }

    fn directory_for(&self, descriptor: &ResourceDescriptor) -> PathBuf {
        match self.layout {
            PathLayout::Flat => self.dest_dir.clone(),
            PathLayout::BySession => [META_GRADE, META_SUBJECT, META_YEAR, META_SESSION]
                .iter()
                .filter_map(|key| descriptor.meta(key))
                .map(sanitize_filename_component)
                .filter(|segment| !segment.is_empty())
                .fold(self.dest_dir.clone(), |dir, segment| dir.join(segment)),
        }
    }
}

fn claim_unique(base: &Path, claimed: &mut HashSet<String>) -> PathBuf {
    if try_claim(base, claimed) {
        return base.to_path_buf();
    }

    let parent = base.parent().unwrap_or_else(|| Path::new(""));
    let filename = base
        .file_name()
        .map_or_else(|| FALLBACK_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());
    let (stem, ext) = split_extension(&filename);

    let mut suffix = 2usize;
    loop {
        let candidate = parent.join(format!("{stem}_{suffix}{ext}"));
        if try_claim(&candidate, claimed) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Claims `path` and its part file together, or neither.
fn try_claim(path: &Path, claimed: &mut HashSet<String>) -> bool {
    let key = collision_key(path);
    let part_key = collision_key(&part_path_for(path));
    if claimed.contains(&key) || claimed.contains(&part_key) {
        return false;
    }
    claimed.insert(key);
    claimed.insert(part_key);
    true
}

/// `dir/name.pdf` -> `dir/.name.pdf.part`
pub(crate) fn part_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| FALLBACK_FILENAME.into(), |n| n.to_string_lossy());
    path.with_file_name(format!(".{name}.part"))
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Filename for a descriptor: suggested name, else URL last segment, else fallback.
#[must_use]
pub fn filename_for(descriptor: &ResourceDescriptor) -> String {
    let suggested = descriptor.suggested_filename().trim();
    let raw = if suggested.is_empty() {
        Url::parse(descriptor.resource_url())
            .ok()
            .and_then(|url| filename_from_url(&url))
            .unwrap_or_default()
    } else {
        suggested.to_string()
    };

    let sanitized = sanitize_filename(&raw);
    if sanitized.trim_matches('_').is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        truncate_filename(&sanitized, MAX_FILENAME_BYTES)
    }
}

/// Percent-decoded last path segment of a URL, if non-empty.
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    Some(decoded)
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and control characters with `_`. Names that would
/// resolve to `.` or `..` have their dots replaced too.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Sanitizes a directory segment: word characters, `-` and `.` survive,
/// runs of anything else collapse to one `_`.
pub(crate) fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || matches!(c, '-' | '.') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if is_safe_filename_segment(trimmed) {
        trimmed.to_string()
    } else {
        trimmed.replace('.', "_")
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

/// Splits `name` into stem and extension (with the dot); dotfiles have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 && name.len() - pos <= 12 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

fn truncate_filename(name: &str, max_bytes: usize) -> String {
    if name.len() <= max_bytes {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let mut budget = max_bytes.saturating_sub(ext.len());
    while budget > 0 && !stem.is_char_boundary(budget) {
        budget -= 1;
    }
    format!("{}{ext}", &stem[..budget])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn descriptor(url: &str, name: &str) -> ResourceDescriptor {
        ResourceDescriptor::new("test", "https://example.com/list", url, name)
    }

    // ==================== Sanitization ====================

    #[test]
    fn test_sanitize_filename_replaces_invalid_chars() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_filename_dot_segments() {
        assert_eq!(sanitize_filename(".."), "__");
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename("paper.v2.pdf"), "paper.v2.pdf");
    }

    #[test]
    fn test_sanitize_filename_component_collapses_separators() {
        assert_eq!(sanitize_filename_component("May / June  2023"), "May_June_2023");
        assert_eq!(sanitize_filename_component(".."), "__");
        assert_eq!(sanitize_filename_component("  "), "");
    }

    #[test]
    fn test_truncate_filename_keeps_extension() {
        let long = format!("{}.pdf", "x".repeat(300));
        let truncated = truncate_filename(&long, MAX_FILENAME_BYTES);
        assert_eq!(truncated.len(), MAX_FILENAME_BYTES);
        assert!(truncated.ends_with(".pdf"));
    }

    #[test]
    fn test_truncate_filename_respects_char_boundaries() {
        let long = format!("{}.pdf", "é".repeat(200));
        let truncated = truncate_filename(&long, MAX_FILENAME_BYTES);
        assert!(truncated.len() <= MAX_FILENAME_BYTES);
        assert!(truncated.ends_with(".pdf"));
    }

    // ==================== filename_for ====================

    #[test]
    fn test_filename_for_prefers_suggested_name() {
        let d = descriptor("https://example.com/files/x.pdf", "0580_s23_qp_12.pdf");
        assert_eq!(filename_for(&d), "0580_s23_qp_12.pdf");
    }

    #[test]
    fn test_filename_for_falls_back_to_url_segment() {
        let d = descriptor("https://example.com/files/May%202023%20P1.pdf", "  ");
        assert_eq!(filename_for(&d), "May 2023 P1.pdf");
    }

    #[test]
    fn test_filename_for_uses_fallback_when_nothing_usable() {
        let d = descriptor("https://example.com/", "");
        assert_eq!(filename_for(&d), FALLBACK_FILENAME);
        let d = descriptor("https://example.com/", "..");
        assert_eq!(filename_for(&d), FALLBACK_FILENAME);
    }

    // ==================== PathResolver ====================

    #[test]
    fn test_resolve_flat_stays_under_dest_dir() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        for malicious in ["../../etc/passwd", "a/\\b\\c", "/abs/path.pdf"] {
            let path = resolver.resolve(&descriptor("https://e.com/x", malicious));
            assert_eq!(path.parent(), Some(Path::new("/out")), "{malicious}");
            assert!(!path.components().any(|c| c == Component::ParentDir));
        }
    }

    #[test]
    fn test_resolve_by_session_nests_present_metadata() {
        let resolver = PathResolver::new("/out", PathLayout::BySession);
        let d = descriptor("https://e.com/a.pdf", "a.pdf")
            .with_metadata(META_GRADE, "IGCSE")
            .with_metadata(META_SUBJECT, "Mathematics (0580)")
            .with_metadata(META_YEAR, "2023");
        assert_eq!(
            resolver.resolve(&d),
            PathBuf::from("/out/IGCSE/Mathematics_0580/2023/a.pdf")
        );
    }

    #[test]
    fn test_resolve_batch_suffixes_colliding_names_in_order() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch = vec![
            descriptor("https://e.com/1/paper.pdf", "paper.pdf"),
            descriptor("https://e.com/2/paper.pdf", "paper.pdf"),
            descriptor("https://e.com/3/PAPER.pdf", "PAPER.pdf"),
        ];
        assert_eq!(
            resolver.resolve_batch(&batch),
            vec![
                ResolvedPath::Claimed(PathBuf::from("/out/paper.pdf")),
                ResolvedPath::Claimed(PathBuf::from("/out/paper_2.pdf")),
                ResolvedPath::Claimed(PathBuf::from("/out/PAPER_3.pdf")),
            ]
        );
    }

    #[test]
    fn test_resolve_batch_marks_same_url_as_duplicate() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch = vec![
            descriptor("https://e.com/a.pdf", "a.pdf"),
            descriptor("https://e.com/b.pdf", "b.pdf"),
            descriptor("https://e.com/a.pdf", "renamed.pdf"),
        ];
        let resolved = resolver.resolve_batch(&batch);
        assert_eq!(resolved[2], ResolvedPath::DuplicateOf(0));
    }

    #[test]
    fn test_resolve_batch_is_deterministic() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch: Vec<_> = (0..10)
            .map(|i| descriptor(&format!("https://e.com/{i}/f.pdf"), "f.pdf"))
            .collect();
        assert_eq!(resolver.resolve_batch(&batch), resolver.resolve_batch(&batch));
    }

    #[test]
    fn test_resolve_batch_suffix_skips_already_claimed_names() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch = vec![
            descriptor("https://e.com/1", "f_2.pdf"),
            descriptor("https://e.com/2", "f.pdf"),
            descriptor("https://e.com/3", "f.pdf"),
        ];
        assert_eq!(
            resolver.resolve_batch(&batch)[2],
            ResolvedPath::Claimed(PathBuf::from("/out/f_3.pdf"))
        );
    }

    #[test]
    fn test_resolve_batch_reserves_part_file_of_claimed_name() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch = vec![
            descriptor("https://e.com/1", "a.pdf"),
            descriptor("https://e.com/2", ".a.pdf.part"),
        ];
        let resolved = resolver.resolve_batch(&batch);

        assert_eq!(resolved[0], ResolvedPath::Claimed(PathBuf::from("/out/a.pdf")));
        let ResolvedPath::Claimed(second) = &resolved[1] else {
            panic!("expected a claimed path: {resolved:?}");
        };
        assert_ne!(second, &part_path_for(Path::new("/out/a.pdf")));
        assert_eq!(second, &PathBuf::from("/out/.a.pdf_2.part"));
    }

    #[test]
    fn test_resolve_batch_part_name_first_pushes_real_name_aside() {
        let resolver = PathResolver::new("/out", PathLayout::Flat);
        let batch = vec![
            descriptor("https://e.com/1", ".A.pdf.part"),
            descriptor("https://e.com/2", "a.pdf"),
        ];
        let resolved = resolver.resolve_batch(&batch);

        assert_eq!(resolved[0], ResolvedPath::Claimed(PathBuf::from("/out/.A.pdf.part")));
        assert_eq!(resolved[1], ResolvedPath::Claimed(PathBuf::from("/out/a_2.pdf")));
    }

    #[test]
    fn test_split_extension_dotfile_has_no_extension() {
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
    }
}
