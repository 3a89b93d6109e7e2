//! Subcommand handlers. Each returns the process exit outcome or a
//! structural error (which exits with code 1).

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use paperfetch_core::{
    BatchReport, DownloadRequest, PathLayout, ResourceDescriptor, ScrapeRequest, SourceQuery,
    ToolFacade,
};

use crate::ProcessExit;
use crate::cli::{BatchArgs, ScrapeArgs};

/// `paperfetch sources`
pub(crate) fn run_sources(facade: &ToolFacade) -> Result<ProcessExit> {
    print_json(&facade.sources())?;
    Ok(ProcessExit::Success)
}

/// `paperfetch tools`
pub(crate) fn run_tools(facade: &ToolFacade) -> Result<ProcessExit> {
    print_json(&facade.tool_definitions())?;
    Ok(ProcessExit::Success)
}

/// `paperfetch scrape`
pub(crate) async fn run_scrape(facade: &ToolFacade, args: &ScrapeArgs) -> Result<ProcessExit> {
    let descriptors = scrape(facade, args).await?;
    print_json(&descriptors)?;
    Ok(ProcessExit::Success)
}

/// `paperfetch download`
pub(crate) async fn run_download(
    facade: &ToolFacade,
    input: &Path,
    batch: &BatchArgs,
) -> Result<ProcessExit> {
    let descriptors = read_descriptors(input)?;
    download(facade, descriptors, batch).await
}

/// `paperfetch fetch`
pub(crate) async fn run_fetch(
    facade: &ToolFacade,
    scrape_args: &ScrapeArgs,
    batch: &BatchArgs,
) -> Result<ProcessExit> {
    let descriptors = scrape(facade, scrape_args).await?;
    if descriptors.is_empty() {
        warn!(source = %scrape_args.source, "nothing found to download");
    }
    download(facade, descriptors, batch).await
}

async fn scrape(facade: &ToolFacade, args: &ScrapeArgs) -> Result<Vec<ResourceDescriptor>> {
    let request = ScrapeRequest {
        source_id: args.source.clone(),
        query: SourceQuery {
            subject: args.subject.clone(),
            grade: args.grade.clone(),
            listing_url: args.url.clone(),
            limit: args.limit,
        },
    };
    let descriptors = facade
        .scrape(&request)
        .await
        .with_context(|| format!("Failed to scrape source '{}'", args.source))?;
    info!(source = %args.source, found = descriptors.len(), "Scrape finished");
    Ok(descriptors)
}

async fn download(
    facade: &ToolFacade,
    descriptors: Vec<ResourceDescriptor>,
    batch: &BatchArgs,
) -> Result<ProcessExit> {
    let request = DownloadRequest {
        descriptors,
        dest_dir: batch.dest.clone(),
        max_concurrency: batch.concurrency,
        layout: if batch.by_session {
            PathLayout::BySession
        } else {
            PathLayout::Flat
        },
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling remaining downloads");
            interrupt.cancel();
        }
    });

    let report = facade
        .download_with_cancel(&request, &cancel)
        .await
        .with_context(|| format!("Failed to download into '{}'", batch.dest.display()))?;

    info!(
        succeeded = report.succeeded(),
        skipped = report.skipped(),
        failed = report.failed(),
        total = report.total(),
        "Download complete"
    );
    print_json(&report)?;
    Ok(determine_exit_outcome(&report))
}

/// Maps a batch report to the process exit outcome.
pub(crate) fn determine_exit_outcome(report: &BatchReport) -> ProcessExit {
    if report.failed() == 0 {
        ProcessExit::Success
    } else {
        ProcessExit::Partial
    }
}

fn read_descriptors(input: &Path) -> Result<Vec<ResourceDescriptor>> {
    let raw = if input == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read descriptors from stdin")?;
        buffer
    } else {
        fs::read_to_string(input)
            .with_context(|| format!("Failed to read descriptor file '{}'", input.display()))?
    };
    serde_json::from_str(&raw).with_context(|| {
        format!(
            "Descriptor input '{}' is not a JSON array of resource descriptors",
            input.display()
        )
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("Failed to write JSON output")?;
    writeln!(out)?;
    Ok(())
}
