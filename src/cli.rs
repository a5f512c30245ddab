//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use comicfetch_core::{DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES};

/// Get comics from a search term.
///
/// Comicfetch searches a comic hosting site by keyword, resolves the best
/// download link for each matching issue and streams the files to disk.
#[derive(Parser, Debug)]
#[command(name = "comicfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Search term for comics
    pub query: String,

    /// Destination directory (must exist)
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Skip issues published before this date (e.g. "21-11-2023", "21 Nov 2023")
    #[arg(short, long, value_name = "DATE")]
    pub newer: Option<String>,

    /// Number of results to retrieve (0 = unlimited)
    #[arg(short, long, default_value_t = 0)]
    pub results: usize,

    /// List discovered pages and links without downloading anything
    #[arg(long)]
    pub dry_run: bool,

    /// Ask before each download
    #[arg(long)]
    pub confirm: bool,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Maximum retry attempts for transient failures (0-10)
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
