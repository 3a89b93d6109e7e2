//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use paperfetch_core::download::{MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Find past examination papers on public websites and download them.
///
/// Output (source lists, descriptors, batch reports) is JSON on stdout;
/// logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "paperfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file path (overrides PAPERFETCH_CONFIG and the default location)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered sources
    Sources,

    /// Print tool definitions (JSON schemas) for automated callers
    Tools,

    /// List downloadable papers on a source without downloading
    Scrape(ScrapeArgs),

    /// Download descriptors from a JSON array (file, or - for stdin)
    Download {
        /// Descriptor JSON file, as printed by `scrape`
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Scrape a source, then download everything found
    Fetch {
        #[command(flatten)]
        scrape: ScrapeArgs,

        #[command(flatten)]
        batch: BatchArgs,
    },
}

/// Source query flags.
#[derive(ClapArgs, Debug, Clone)]
pub struct ScrapeArgs {
    /// Source id (see `paperfetch sources`)
    pub source: String,

    /// Subject name, e.g. "Mathematics"
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Exam level, e.g. IGCSE, EGCSE, JC
    #[arg(short, long)]
    pub grade: Option<String>,

    /// Listing page to parse directly
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,

    /// Approximate maximum number of papers
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Download batch flags.
#[derive(ClapArgs, Debug, Clone)]
pub struct BatchArgs {
    /// Destination directory (created if missing)
    #[arg(short, long, value_name = "DIR")]
    pub dest: PathBuf,

    /// Maximum concurrent downloads (1-32; config default when omitted)
    #[arg(short = 'c', long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Nest files under grade/subject/year/session folders
    #[arg(long)]
    pub by_session: bool,
}

fn parse_concurrency(raw: &str) -> Result<usize, String> {
    let value: usize = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
        ))
    }
}
