//! Tool facade: the typed operations an external caller (agent or script) invokes.
//!
//! # Operations
//!
//! - [`ToolFacade::scrape`] - list downloadable resources on one source
//! - [`ToolFacade::download`] - fetch a list of resources into a directory
//! - [`ToolFacade::sources`] - registered source ids and descriptions
//! - [`ToolFacade::tool_definitions`] / [`ToolFacade::call_tool`] - JSON tool surface
//!
//! The facade only delegates and translates errors into [`ToolError`].

mod error;

pub use error::{ToolError, ToolErrorKind};

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::PipelineConfig;
use crate::download::{
    BatchOptions, DownloadOrchestrator, FetchWorker, PathLayout, build_download_client,
};
use crate::resource::{BatchReport, ResourceDescriptor};
use crate::source::{SourceInfo, SourceQuery, SourceRegistry, build_default_source_registry};

/// Tool name: list registered sources.
pub const TOOL_LIST_SOURCES: &str = "list_sources";
/// Tool name: scrape one source.
pub const TOOL_SCRAPE_SOURCE: &str = "scrape_source";
/// Tool name: download resources.
pub const TOOL_DOWNLOAD_RESOURCES: &str = "download_resources";

/// Input of [`ToolFacade::scrape`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScrapeRequest {
    /// Registered source id.
    pub source_id: String,
    /// Source-specific query.
    #[serde(default)]
    pub query: SourceQuery,
}

/// Input of [`ToolFacade::download`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DownloadRequest {
    /// Resources to fetch, typically from a prior scrape.
    pub descriptors: Vec<ResourceDescriptor>,
    /// Destination directory; created if missing.
    pub dest_dir: PathBuf,
    /// Concurrency bound; the configured default when absent.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Directory layout under `dest_dir`.
    #[serde(default)]
    pub layout: PathLayout,
}

/// One entry of [`ToolFacade::tool_definitions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Stable tool name used by [`ToolFacade::call_tool`].
    pub name: String,
    /// Short human-readable title.
    pub title: String,
    /// When to use the tool.
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: Value,
}

/// Entry point combining the source registry and the download orchestrator.
#[derive(Debug, Clone)]
pub struct ToolFacade {
    registry: Arc<SourceRegistry>,
    orchestrator: DownloadOrchestrator,
    default_concurrency: usize,
}

impl ToolFacade {
    /// Creates a facade over existing components.
    #[must_use]
    pub fn new(registry: Arc<SourceRegistry>, orchestrator: DownloadOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
            default_concurrency: crate::download::DEFAULT_CONCURRENCY,
        }
    }

    /// Builds every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the download HTTP client cannot be built.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let registry = Arc::new(build_default_source_registry(config));
        let client = build_download_client(
            &config.user_agent,
            std::time::Duration::from_secs(config.connect_timeout_secs),
        )?;
        let worker = FetchWorker::new(client, config.retry_policy());
        Ok(Self::new(registry, DownloadOrchestrator::new(worker))
            .with_default_concurrency(config.max_concurrency))
    }

    /// Sets the concurrency used when a request does not specify one.
    #[must_use]
    pub fn with_default_concurrency(mut self, max_concurrency: usize) -> Self {
        self.default_concurrency = max_concurrency;
        self
    }

    /// Registered sources.
    #[must_use]
    pub fn sources(&self) -> Vec<SourceInfo> {
        self.registry.describe()
    }

    /// Lists downloadable resources on one source.
    ///
    /// A page that loads but has no recognizable links yields an empty list.
    ///
    /// # Errors
    ///
    /// - [`ToolError::UnknownSource`] for an unregistered id
    /// - [`ToolError::SourceUnavailable`] if a page fails to load
    /// - [`ToolError::InvalidRequest`] if the query lacks required fields
    #[instrument(skip(self), fields(source = %request.source_id))]
    pub async fn scrape(
        &self,
        request: &ScrapeRequest,
    ) -> Result<Vec<ResourceDescriptor>, ToolError> {
        let extractor = self.registry.lookup(&request.source_id)?;
        let descriptors = extractor.extract(&request.query).await?;
        info!(count = descriptors.len(), "scrape complete");
        Ok(descriptors)
    }

    /// Downloads resources; the report always has one outcome per descriptor.
    ///
    /// # Errors
    ///
    /// - [`ToolError::DestinationUnwritable`] if `dest_dir` cannot be used
    /// - [`ToolError::InvalidRequest`] for an out-of-range concurrency
    pub async fn download(&self, request: &DownloadRequest) -> Result<BatchReport, ToolError> {
        self.download_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// [`download`](Self::download) with a caller-held cancellation token.
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    #[instrument(skip(self, request, cancel), fields(items = request.descriptors.len()))]
    pub async fn download_with_cancel(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchReport, ToolError> {
        let options = BatchOptions {
            max_concurrency: request
                .max_concurrency
                .unwrap_or(self.default_concurrency),
            layout: request.layout,
        };
        let report = self
            .orchestrator
            .download_batch(&request.descriptors, &request.dest_dir, options, cancel)
            .await?;
        Ok(report)
    }

    /// JSON descriptions of the callable tools.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let source_ids: Vec<&str> = self.registry.source_ids();
        vec![
            ToolDefinition {
                name: TOOL_LIST_SOURCES.to_string(),
                title: "List past-paper sources".to_string(),
                description: "Returns the id and description of every source that scrape_source accepts."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            },
            ToolDefinition {
                name: TOOL_SCRAPE_SOURCE.to_string(),
                title: "Find past papers on a source".to_string(),
                description: "Lists downloadable documents on one source without downloading them. \
                    Returns an array of resource descriptors to pass to download_resources. \
                    An empty array means the page loaded but no papers were recognized."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["sourceId"],
                    "additionalProperties": false,
                    "properties": {
                        "sourceId": {
                            "type": "string",
                            "enum": source_ids,
                            "description": "Source to scrape."
                        },
                        "query": {
                            "type": "object",
                            "additionalProperties": false,
                            "properties": {
                                "subject": {"type": "string", "description": "Subject name, e.g. Mathematics."},
                                "grade": {"type": "string", "description": "Exam level, e.g. IGCSE, EGCSE, JC."},
                                "listingUrl": {"type": "string", "format": "uri", "description": "Listing page to parse directly."},
                                "limit": {"type": "integer", "minimum": 1, "description": "Approximate maximum number of documents."}
                            }
                        }
                    }
                }),
            },
            ToolDefinition {
                name: TOOL_DOWNLOAD_RESOURCES.to_string(),
                title: "Download past papers".to_string(),
                description: "Downloads resource descriptors (from scrape_source) into a local directory. \
                    Returns a report with one outcome per descriptor, in input order; existing files are skipped."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "required": ["descriptors", "destDir"],
                    "additionalProperties": false,
                    "properties": {
                        "descriptors": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["sourceId", "pageUrl", "resourceUrl", "suggestedFilename"],
                                "properties": {
                                    "sourceId": {"type": "string"},
                                    "pageUrl": {"type": "string"},
                                    "resourceUrl": {"type": "string"},
                                    "suggestedFilename": {"type": "string"},
                                    "metadata": {"type": "object", "additionalProperties": {"type": "string"}}
                                }
                            }
                        },
                        "destDir": {"type": "string", "description": "Directory to write into; created if missing."},
                        "maxConcurrency": {
                            "type": "integer",
                            "minimum": crate::download::MIN_CONCURRENCY,
                            "maximum": crate::download::MAX_CONCURRENCY
                        },
                        "layout": {"type": "string", "enum": ["flat", "by_session"]}
                    }
                }),
            },
        ]
    }

    /// Runs a tool by name with JSON arguments and returns its JSON result.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidRequest`] for an unknown tool or malformed
    /// arguments, and the operation's own errors otherwise.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        match name {
            TOOL_LIST_SOURCES => to_value(&self.sources()),
            TOOL_SCRAPE_SOURCE => {
                let request: ScrapeRequest = parse_arguments(name, arguments)?;
                to_value(&self.scrape(&request).await?)
            }
            TOOL_DOWNLOAD_RESOURCES => {
                let request: DownloadRequest = parse_arguments(name, arguments)?;
                to_value(&self.download(&request).await?)
            }
            other => Err(ToolError::invalid_request(format!(
                "unknown tool '{other}'; expected one of {TOOL_LIST_SOURCES}, {TOOL_SCRAPE_SOURCE}, {TOOL_DOWNLOAD_RESOURCES}"
            ))),
        }
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::invalid_request(format!("arguments for '{tool}': {e}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::invalid_request(format!("unserializable result: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::RetryPolicy;

    fn facade() -> ToolFacade {
        let worker = FetchWorker::new(
            reqwest::Client::new(),
            RetryPolicy::with_max_attempts(1),
        );
        ToolFacade::new(
            Arc::new(SourceRegistry::new()),
            DownloadOrchestrator::new(worker),
        )
    }

    #[test]
    fn test_tool_definitions_names() {
        let names: Vec<_> = facade()
            .tool_definitions()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec!["list_sources", "scrape_source", "download_resources"]
        );
    }

    #[test]
    fn test_tool_definition_serializes_input_schema_camel_case() {
        let defs = facade().tool_definitions();
        let json = serde_json::to_value(&defs[2]).unwrap();
        assert!(json.get("inputSchema").is_some());
        assert_eq!(json["inputSchema"]["properties"]["maxConcurrency"]["maximum"], 32);
    }

    #[tokio::test]
    async fn test_scrape_unknown_source() {
        let request = ScrapeRequest {
            source_id: "nope".to_string(),
            query: SourceQuery::default(),
        };
        let err = facade().scrape(&request).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::UnknownSource);
    }

    #[tokio::test]
    async fn test_download_empty_request_is_empty_report() {
        let request = DownloadRequest {
            descriptors: Vec::new(),
            dest_dir: PathBuf::from("/definitely/not/created"),
            max_concurrency: None,
            layout: PathLayout::Flat,
        };
        let report = facade().download(&request).await.unwrap();
        assert!(report.is_empty());
        assert!(!std::path::Path::new("/definitely/not/created").exists());
    }

    #[tokio::test]
    async fn test_call_tool_unknown_tool_and_bad_arguments() {
        let facade = facade();
        let err = facade.call_tool("delete_all", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidRequest);

        let err = facade
            .call_tool(TOOL_SCRAPE_SOURCE, json!({"source": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_call_tool_list_sources() {
        let value = facade().call_tool(TOOL_LIST_SOURCES, json!({})).await.unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_download_request_deserializes_defaults() {
        let request: DownloadRequest =
            serde_json::from_value(json!({"descriptors": [], "destDir": "out"})).unwrap();
        assert_eq!(request.max_concurrency, None);
        assert_eq!(request.layout, PathLayout::Flat);
    }
}
