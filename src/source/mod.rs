//! Link extraction from external past-paper sources.
//!
//! # Architecture
//!
//! - [`LinkExtractor`] - Async trait every source adapter implements
//! - [`SourceRegistry`] - Id-keyed collection of extractors, built once at startup
//! - [`PageFetcher`] - Shared page-fetching policy (user-agent, timeouts)
//! - [`EceswaExtractor`] - Eswatini examinations council subject pages
//! - [`PapaCambridgeExtractor`] - PapaCambridge grade/subject/session folders
//! - [`SaveMyExamsExtractor`] - SaveMyExams past-paper tables
//! - [`LinkListExtractor`] - Any page with plain document links
//!
//! Extractors never download document bytes. A page that fails to load is
//! [`ExtractError::SourceUnavailable`]; a page that loads but has no
//! recognizable links yields an empty list.
//!
//! # Example
//!
//! ```no_run
//! use paperfetch_core::config::PipelineConfig;
//! use paperfetch_core::source::{SourceQuery, build_default_source_registry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = build_default_source_registry(&PipelineConfig::default());
//! let extractor = registry.lookup("papacambridge")?;
//! let query = SourceQuery {
//!     grade: Some("IGCSE".to_string()),
//!     subject: Some("Mathematics".to_string()),
//!     limit: Some(10),
//!     ..SourceQuery::default()
//! };
//! for descriptor in extractor.extract(&query).await? {
//!     println!("{}", descriptor.resource_url());
//! }
//! # Ok(())
//! # }
//! ```

mod eceswa;
mod error;
mod link_list;
mod page;
mod papacambridge;
mod registry;
mod savemyexams;
mod utils;

pub use eceswa::EceswaExtractor;
pub use error::{ExtractError, RegistryError};
pub use link_list::LinkListExtractor;
pub use page::{FetchedPage, HttpSettings, PageFetcher};
pub use papacambridge::PapaCambridgeExtractor;
pub use registry::{SourceInfo, SourceRegistry};
pub use savemyexams::SaveMyExamsExtractor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PipelineConfig;
use crate::resource::ResourceDescriptor;

/// What to look for on a source. Each adapter documents which fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SourceQuery {
    /// Subject name as shown by the source (matched case-insensitively).
    pub subject: Option<String>,
    /// Examination level (e.g. `IGCSE`, `EGCSE`, `JC`).
    pub grade: Option<String>,
    /// Listing page to parse directly, skipping index navigation.
    pub listing_url: Option<String>,
    /// Upper bound on returned descriptors (adapter-specific rounding).
    pub limit: Option<usize>,
}

impl SourceQuery {
    /// Trimmed, non-blank subject.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        non_blank(self.subject.as_deref())
    }

    /// Trimmed, non-blank grade.
    #[must_use]
    pub fn grade(&self) -> Option<&str> {
        non_blank(self.grade.as_deref())
    }

    /// Trimmed, non-blank listing URL.
    #[must_use]
    pub fn listing_url(&self) -> Option<&str> {
        non_blank(self.listing_url.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A source adapter: turns a query into resource descriptors.
///
/// # Object Safety
///
/// Uses `async_trait` so extractors can live behind `Arc<dyn LinkExtractor>`
/// in the registry; native async trait methods are not object-safe.
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    /// Stable source id (e.g. `"papacambridge"`).
    fn source_id(&self) -> &str;

    /// One-line description for tool listings.
    fn description(&self) -> &str;

    /// Fetches and parses the source's listing pages.
    async fn extract(&self, query: &SourceQuery) -> Result<Vec<ResourceDescriptor>, ExtractError>;
}

/// Builds the registry with every built-in source.
///
/// Per-source base URL overrides come from `[sources.<id>]`. An adapter that
/// cannot be constructed is logged and left out.
#[must_use]
pub fn build_default_source_registry(config: &PipelineConfig) -> SourceRegistry {
    let settings = config.http_settings();
    let mut registry = SourceRegistry::new();

    let eceswa = match config.source_base_url(eceswa::SOURCE_ID) {
        Some(base) => EceswaExtractor::with_base_url(&settings, base),
        None => EceswaExtractor::new(&settings),
    };
    register_or_warn(&mut registry, eceswa.map(|e| Box::new(e) as Box<dyn LinkExtractor>));

    let papacambridge = match config.source_base_url(papacambridge::SOURCE_ID) {
        Some(base) => PapaCambridgeExtractor::with_base_url(&settings, base),
        None => PapaCambridgeExtractor::new(&settings),
    };
    register_or_warn(
        &mut registry,
        papacambridge.map(|e| Box::new(e) as Box<dyn LinkExtractor>),
    );

    let savemyexams = match config.source_base_url(savemyexams::SOURCE_ID) {
        Some(base) => SaveMyExamsExtractor::with_base_urls(
            &settings,
            base,
            savemyexams::DEFAULT_DOWNLOAD_BASE_URL,
        ),
        None => SaveMyExamsExtractor::new(&settings),
    };
    register_or_warn(
        &mut registry,
        savemyexams.map(|e| Box::new(e) as Box<dyn LinkExtractor>),
    );

    register_or_warn(
        &mut registry,
        LinkListExtractor::new(&settings).map(|e| Box::new(e) as Box<dyn LinkExtractor>),
    );

    registry
}

fn register_or_warn(
    registry: &mut SourceRegistry,
    extractor: Result<Box<dyn LinkExtractor>, ExtractError>,
) {
    match extractor {
        Ok(extractor) => {
            let id = extractor.source_id().to_string();
            if let Err(error) = registry.register(id, extractor.into()) {
                warn!(error = %error, "source not registered");
            }
        }
        Err(error) => warn!(
            error = %error,
            "source unavailable; continuing with remaining sources"
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_query_accessors_trim_and_drop_blank() {
        let query = SourceQuery {
            subject: Some("  Mathematics ".to_string()),
            grade: Some("   ".to_string()),
            ..SourceQuery::default()
        };
        assert_eq!(query.subject(), Some("Mathematics"));
        assert_eq!(query.grade(), None);
        assert_eq!(query.listing_url(), None);
    }

    #[test]
    fn test_source_query_deserializes_camel_case_and_rejects_unknown() {
        let query: SourceQuery =
            serde_json::from_str(r#"{"listingUrl":"https://e.com/l","limit":3}"#).unwrap();
        assert_eq!(query.listing_url(), Some("https://e.com/l"));
        assert_eq!(query.limit, Some(3));

        let err = serde_json::from_str::<SourceQuery>(r#"{"subjct":"typo"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_default_registry_has_all_builtin_sources() {
        let registry = build_default_source_registry(&PipelineConfig::default());
        assert_eq!(
            registry.source_ids(),
            vec!["eceswa", "link-list", "papacambridge", "savemyexams"]
        );
    }

    #[test]
    fn test_default_registry_skips_source_with_bad_override() {
        let config: PipelineConfig =
            toml::from_str("[sources.eceswa]\nbase_url = \"ftp://mirror\"\n").unwrap();
        let registry = build_default_source_registry(&config);
        assert!(registry.lookup("eceswa").is_err());
        assert!(registry.lookup("papacambridge").is_ok());
    }
}
