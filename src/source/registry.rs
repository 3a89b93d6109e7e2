//! Source registry: maps a stable source id to its extractor.
//!
//! Populated once at startup and read-only afterwards; the facade holds it
//! in an `Arc` and only ever calls `&self` methods.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{LinkExtractor, RegistryError};

/// Id and description of one registered source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    /// Stable source id.
    pub id: String,
    /// What the source is and which query fields it needs.
    pub description: String,
}

/// Id-keyed collection of extractors. Ids are stored trimmed and lowercased.
#[derive(Default)]
pub struct SourceRegistry {
    extractors: BTreeMap<String, Arc<dyn LinkExtractor>>,
}

impl SourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extractor under `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateSource`] if the id is taken.
    #[tracing::instrument(skip_all, fields(source_id = tracing::field::Empty))]
    pub fn register(
        &mut self,
        source_id: impl Into<String>,
        extractor: Arc<dyn LinkExtractor>,
    ) -> Result<(), RegistryError> {
        let id = normalize_id(&source_id.into());
        tracing::Span::current().record("source_id", id.as_str());
        if self.extractors.contains_key(&id) {
            return Err(RegistryError::DuplicateSource { source_id: id });
        }
        debug!(source_id = %id, "Registering source");
        self.extractors.insert(id, extractor);
        Ok(())
    }

    /// Finds the extractor for `source_id` (case-insensitive, trimmed).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownSource`] if nothing is registered under the id.
    pub fn lookup(&self, source_id: &str) -> Result<Arc<dyn LinkExtractor>, RegistryError> {
        self.extractors
            .get(&normalize_id(source_id))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSource {
                source_id: source_id.to_string(),
                known: self.source_ids().join(", "),
            })
    }

    /// Registered ids in sorted order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<&str> {
        self.extractors.keys().map(String::as_str).collect()
    }

    /// Id and description of every source, sorted by id.
    #[must_use]
    pub fn describe(&self) -> Vec<SourceInfo> {
        self.extractors
            .iter()
            .map(|(id, extractor)| SourceInfo {
                id: id.clone(),
                description: extractor.description().to_string(),
            })
            .collect()
    }

    /// Number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    /// Returns true if no sources are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.source_ids())
            .finish()
    }
}

fn normalize_id(source_id: &str) -> String {
    source_id.trim().to_lowercase()
}
