//! Paperfetch core library
//!
//! Finds past examination papers on public websites and downloads them into a
//! local directory, tolerating flaky hosts and partial failures.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`source`] - Link extractors per website and the source registry
//! - [`download`] - Path resolution, fetch workers and batch orchestration
//! - [`facade`] - Typed operations (and a JSON tool surface) for external callers
//! - [`config`] - TOML configuration with documented defaults
//! - [`resource`] - Descriptors, outcomes and batch reports shared by all layers

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod facade;
pub mod resource;
pub mod source;
pub mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig, RetrySettings};
pub use download::{
    BatchOptions, DownloadOrchestrator, FetchWorker, PathLayout, PathResolver, RetryPolicy,
};
pub use facade::{DownloadRequest, ScrapeRequest, ToolError, ToolErrorKind, ToolFacade};
pub use resource::{
    BatchReport, FailureKind, FetchFailure, FetchOutcome, FetchStatus, ResourceDescriptor,
};
pub use source::{LinkExtractor, SourceQuery, SourceRegistry};
