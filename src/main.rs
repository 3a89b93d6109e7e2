//! CLI entry point for paperfetch.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use paperfetch_core::{PipelineConfig, ToolFacade};
use tracing::debug;

mod cli;
mod commands;

use cli::{Args, Command};

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Everything succeeded (or was skipped).
    Success,
    /// The batch completed but some items failed.
    Partial,
}

impl ProcessExit {
    fn code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::Partial => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(outcome) => outcome.code(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) {
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ProcessExit> {
    let config = PipelineConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let facade = ToolFacade::from_config(&config).context("Failed to build HTTP client")?;

    match &args.command {
        Command::Sources => commands::run_sources(&facade),
        Command::Tools => commands::run_tools(&facade),
        Command::Scrape(scrape) => commands::run_scrape(&facade, scrape).await,
        Command::Download { input, batch } => commands::run_download(&facade, input, batch).await,
        Command::Fetch { scrape, batch } => commands::run_fetch(&facade, scrape, batch).await,
    }
}
