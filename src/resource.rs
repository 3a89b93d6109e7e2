//! Records that flow between extractors, the orchestrator, and the caller.
//!
//! A [`ResourceDescriptor`] is produced by a link extractor and is never
//! mutated afterwards. A [`FetchOutcome`] is produced for every descriptor
//! that enters a batch, and a [`BatchReport`] collects them in input order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Metadata key for the examination level (e.g. `IGCSE`, `EGCSE`).
pub const META_GRADE: &str = "grade";
/// Metadata key for the subject name as shown by the source.
pub const META_SUBJECT: &str = "subject";
/// Metadata key for the syllabus / subject code (e.g. `0580`).
pub const META_SUBJECT_CODE: &str = "subject_code";
/// Metadata key for the four-digit exam year.
pub const META_YEAR: &str = "year";
/// Metadata key for the exam session (e.g. `May-June`, `November`).
pub const META_SESSION: &str = "session";
/// Metadata key for the document type (`qp`, `in`, `sf`).
pub const META_PAPER_TYPE: &str = "paper_type";
/// Metadata key for the paper/variant number (e.g. `12`).
pub const META_PAPER_VARIANT: &str = "paper_variant";
/// Metadata key for the anchor text a link was found under.
pub const META_LINK_TEXT: &str = "link_text";

/// Normalized record of one downloadable document, before its bytes are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    source_id: String,
    page_url: String,
    resource_url: String,
    suggested_filename: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with no metadata.
    #[must_use]
    pub fn new(
        source_id: impl Into<String>,
        page_url: impl Into<String>,
        resource_url: impl Into<String>,
        suggested_filename: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            page_url: page_url.into(),
            resource_url: resource_url.into(),
            suggested_filename: suggested_filename.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds one metadata entry. Empty values are ignored.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.metadata.insert(key.into(), value.trim().to_string());
        }
        self
    }

    /// Id of the source whose extractor produced this descriptor.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Listing page the link was found on.
    #[must_use]
    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// Absolute URL of the document bytes.
    #[must_use]
    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    /// Preferred file name; not guaranteed unique across descriptors.
    #[must_use]
    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    /// Free-form metadata (subject, year, paper code, ...).
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns one metadata value.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Final state of one descriptor in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Bytes were fetched and renamed into place.
    Success,
    /// A non-empty file already existed at the destination.
    Skipped,
    /// The item could not be fetched; see `last_error`.
    Failed,
}

/// Why an item failed, in caller-facing terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, timeout, 5xx or 429 failures that outlasted the retry budget.
    TransientFetchFailure,
    /// 4xx (other than 429), length mismatch, bad URL or local I/O failure.
    DefinitiveFetchFailure,
    /// The batch was cancelled before this item finished.
    Cancelled,
}

/// Error detail attached to a failed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub message: String,
}

/// Result of processing one descriptor.
///
/// `final_path` is present iff the status is `Success` or `Skipped`;
/// `last_error` is present iff the status is `Failed`. The constructors are
/// the only way to build one, so those rules always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    descriptor: ResourceDescriptor,
    status: FetchStatus,
    final_path: Option<PathBuf>,
    attempts: u32,
    last_error: Option<FetchFailure>,
}

impl FetchOutcome {
    /// Item fetched and stored at `path`.
    #[must_use]
    pub fn success(descriptor: ResourceDescriptor, path: PathBuf, attempts: u32) -> Self {
        Self {
            descriptor,
            status: FetchStatus::Success,
            final_path: Some(path),
            attempts,
            last_error: None,
        }
    }

    /// Item already present at `path`; nothing was requested.
    #[must_use]
    pub fn skipped(descriptor: ResourceDescriptor, path: PathBuf, attempts: u32) -> Self {
        Self {
            descriptor,
            status: FetchStatus::Skipped,
            final_path: Some(path),
            attempts,
            last_error: None,
        }
    }

    /// Item failed after `attempts` network attempts.
    #[must_use]
    pub fn failed(
        descriptor: ResourceDescriptor,
        kind: FailureKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            descriptor,
            status: FetchStatus::Failed,
            final_path: None,
            attempts,
            last_error: Some(FetchFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Item was cancelled before it could finish.
    #[must_use]
    pub fn cancelled(descriptor: ResourceDescriptor, attempts: u32) -> Self {
        Self::failed(
            descriptor,
            FailureKind::Cancelled,
            "batch cancelled before the item completed",
            attempts,
        )
    }

    /// Rebinds this outcome to another descriptor that shares its resource.
    ///
    /// A success becomes `Skipped` because the bytes were written by the
    /// primary item, not by this one.
    #[must_use]
    pub(crate) fn for_duplicate(&self, descriptor: ResourceDescriptor) -> Self {
        let status = match self.status {
            FetchStatus::Success | FetchStatus::Skipped => FetchStatus::Skipped,
            FetchStatus::Failed => FetchStatus::Failed,
        };
        Self {
            descriptor,
            status,
            final_path: self.final_path.clone(),
            attempts: 0,
            last_error: self.last_error.clone(),
        }
    }

    /// The descriptor this outcome belongs to.
    #[must_use]
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Final status.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    /// Where the file lives (Success/Skipped only).
    #[must_use]
    pub fn final_path(&self) -> Option<&Path> {
        self.final_path.as_deref()
    }

    /// Number of network attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Failure detail (Failed only).
    #[must_use]
    pub fn last_error(&self) -> Option<&FetchFailure> {
        self.last_error.as_ref()
    }
}

/// Per-item outcomes in input order plus aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    outcomes: Vec<FetchOutcome>,
    succeeded: usize,
    skipped: usize,
    failed: usize,
}

impl BatchReport {
    /// Builds a report, counting statuses from the outcomes themselves.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<FetchOutcome>) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        let succeeded = count(FetchStatus::Success);
        let skipped = count(FetchStatus::Skipped);
        let failed = count(FetchStatus::Failed);
        Self {
            outcomes,
            succeeded,
            skipped,
            failed,
        }
    }

    /// Outcomes, positionally aligned with the input descriptors.
    #[must_use]
    pub fn outcomes(&self) -> &[FetchOutcome] {
        &self.outcomes
    }

    /// Number of `Success` outcomes.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Number of `Skipped` outcomes.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Number of `Failed` outcomes.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Total number of outcomes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if the batch held no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
