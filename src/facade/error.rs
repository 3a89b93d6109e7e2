//! Facade error taxonomy.
//!
//! Collapses the per-layer library errors into the few kinds an external
//! caller branches on. Per-item download failures never appear here; they
//! live in the [`BatchReport`](crate::BatchReport).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::download::OrchestratorError;
use crate::source::{ExtractError, RegistryError};

/// Stable, serializable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No source registered under the requested id.
    UnknownSource,
    /// A source page could not be fetched.
    SourceUnavailable,
    /// The request itself is malformed (missing fields, bad values, unknown tool).
    InvalidRequest,
    /// The download destination cannot be created or written.
    DestinationUnwritable,
}

/// Errors returned by [`ToolFacade`](super::ToolFacade) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// Registry miss.
    #[error("unknown source '{source_id}'\n  Suggestion: known sources are: {known}")]
    UnknownSource {
        /// Requested id.
        source_id: String,
        /// Comma-separated registered ids.
        known: String,
    },

    /// Page fetch failed or returned a non-success status.
    #[error("source '{source_id}' unavailable: {url}{}: {reason}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    SourceUnavailable {
        /// Source whose page failed.
        source_id: String,
        /// Page URL.
        url: String,
        /// HTTP status when a response was received.
        status: Option<u16>,
        /// Cause.
        reason: String,
    },

    /// Malformed request.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong.
        reason: String,
    },

    /// Destination directory cannot be created or written.
    #[error("destination '{path}' is not writable: {reason}\n  Suggestion: Choose a directory you can write to")]
    DestinationUnwritable {
        /// Destination as given.
        path: String,
        /// Underlying I/O error.
        reason: String,
    },
}

impl ToolError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownSource { .. } => ToolErrorKind::UnknownSource,
            Self::SourceUnavailable { .. } => ToolErrorKind::SourceUnavailable,
            Self::InvalidRequest { .. } => ToolErrorKind::InvalidRequest,
            Self::DestinationUnwritable { .. } => ToolErrorKind::DestinationUnwritable,
        }
    }

    /// Creates an `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// JSON form for tool-call responses: `{"error": {"kind": ..., "message": ...}}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<RegistryError> for ToolError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::UnknownSource { source_id, known } => {
                Self::UnknownSource { source_id, known }
            }
            RegistryError::DuplicateSource { .. } => Self::invalid_request(error.to_string()),
        }
    }
}

impl From<ExtractError> for ToolError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::SourceUnavailable {
                source_id,
                url,
                status,
                reason,
            } => Self::SourceUnavailable {
                source_id,
                url,
                status,
                reason,
            },
            ExtractError::InvalidQuery { .. } => Self::invalid_request(error.to_string()),
            ExtractError::Configuration { source_id, reason } => Self::SourceUnavailable {
                source_id,
                url: String::new(),
                status: None,
                reason,
            },
        }
    }
}

impl From<OrchestratorError> for ToolError {
    fn from(error: OrchestratorError) -> Self {
        match error {
            OrchestratorError::DestinationUnwritable { path, source } => {
                Self::DestinationUnwritable {
                    path: path.display().to_string(),
                    reason: source.to_string(),
                }
            }
            OrchestratorError::InvalidConcurrency { .. } => Self::invalid_request(error.to_string()),
        }
    }
}
