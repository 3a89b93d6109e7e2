//! Error types for link extraction and source lookup.
//!
//! Follows the What/Why/Fix pattern: each message names what failed, why,
//! and (where useful) what to try next.

use thiserror::Error;

/// Errors that can occur while extracting links from a source.
///
/// A page that loads but contains no recognizable links is not an error;
/// extractors return an empty list for that case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// A page could not be fetched (transport error or non-success status).
    #[error("source '{source_id}' unavailable: GET {url} failed{}: {reason}", .status.map(|s| format!(" with HTTP {s}")).unwrap_or_default())]
    SourceUnavailable {
        /// Source whose page failed.
        source_id: String,
        /// URL that was requested.
        url: String,
        /// HTTP status, when a response was received.
        status: Option<u16>,
        /// Underlying cause.
        reason: String,
    },

    /// The query is missing fields this source needs, or has malformed ones.
    #[error("invalid query for source '{source_id}': {reason}\n  Suggestion: {suggestion}")]
    InvalidQuery {
        /// Source that rejected the query.
        source_id: String,
        /// What is wrong with the query.
        reason: String,
        /// How to fix the query.
        suggestion: String,
    },

    /// The extractor could not be constructed (bad base URL, client build failure).
    #[error("source '{source_id}' misconfigured: {reason}")]
    Configuration {
        /// Source being constructed.
        source_id: String,
        /// What went wrong.
        reason: String,
    },
}

impl ExtractError {
    /// Creates a `SourceUnavailable` error for a response with a non-success status.
    #[must_use]
    pub fn http_status(source_id: &str, url: &str, status: u16) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.to_string(),
            url: url.to_string(),
            status: Some(status),
            reason: "non-success status".to_string(),
        }
    }

    /// Creates a `SourceUnavailable` error for a transport failure.
    #[must_use]
    pub fn transport(source_id: &str, url: &str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.to_string(),
            url: url.to_string(),
            status: None,
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidQuery` error for a missing required field.
    #[must_use]
    pub fn missing_field(source_id: &str, field: &str) -> Self {
        Self::InvalidQuery {
            source_id: source_id.to_string(),
            reason: format!("'{field}' is required"),
            suggestion: format!(
                "Provide '{field}', or pass 'listingUrl' to parse a listing page directly"
            ),
        }
    }

    /// Creates an `InvalidQuery` error with a custom reason.
    #[must_use]
    pub fn invalid_query(source_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            source_id: source_id.to_string(),
            reason: reason.into(),
            suggestion: "Check the query fields and try again".to_string(),
        }
    }

    /// Creates a `Configuration` error.
    #[must_use]
    pub fn configuration(source_id: &str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            source_id: source_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from the source registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No extractor is registered under this id.
    #[error("unknown source '{source_id}'\n  Suggestion: known sources are: {known}")]
    UnknownSource {
        /// The id that was looked up.
        source_id: String,
        /// Comma-separated list of registered ids.
        known: String,
    },

    /// An extractor is already registered under this id.
    #[error("source '{source_id}' is already registered")]
    DuplicateSource {
        /// The conflicting id.
        source_id: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_display_with_status() {
        let err = ExtractError::http_status("eceswa", "https://e.org/index.php", 404);
        let msg = err.to_string();
        assert!(msg.contains("eceswa"), "{msg}");
        assert!(msg.contains("HTTP 404"), "{msg}");
        assert!(msg.contains("https://e.org/index.php"), "{msg}");
    }

    #[test]
    fn test_source_unavailable_display_without_status() {
        let err = ExtractError::transport("eceswa", "https://e.org/", "connection refused");
        let msg = err.to_string();
        assert!(!msg.contains("HTTP"), "{msg}");
        assert!(msg.contains("connection refused"), "{msg}");
    }

    #[test]
    fn test_missing_field_has_suggestion() {
        let err = ExtractError::missing_field("link-list", "listingUrl");
        let msg = err.to_string();
        assert!(msg.contains("'listingUrl' is required"), "{msg}");
        assert!(msg.contains("Suggestion:"), "{msg}");
    }

    #[test]
    fn test_unknown_source_lists_known_ids() {
        let err = RegistryError::UnknownSource {
            source_id: "nope".to_string(),
            known: "eceswa, link-list".to_string(),
        };
        assert!(err.to_string().contains("eceswa, link-list"));
    }
}
