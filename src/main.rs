//! CLI entry point for the comicfetch tool.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::MultiProgress;
use tracing::{debug, info, warn};

use comicfetch_core::{
    DownloadEngine, GetComicsSite, HttpClient, RetryPolicy, SearchQuery, discover, resolve_date,
    resolve_links,
};

mod cli;
mod output;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Systemic configuration errors are fatal before any network activity.
    let cutoff = args
        .newer
        .as_deref()
        .map(resolve_date)
        .transpose()
        .context("could not read the --newer date")?;

    if !args.output.exists() || !args.output.is_dir() {
        bail!(
            "'{}' does not exist or is not a valid directory",
            args.output.display()
        );
    }

    let site = GetComicsSite::new()?;

    tokio::select! {
        result = run(&args, &site, cutoff) => result,
        _ = tokio::signal::ctrl_c() => {
            // In-flight scratch files are abandoned; completed downloads stay.
            warn!("interrupted, abandoning in-flight downloads");
            Ok(ExitCode::from(130))
        }
    }
}

async fn run(
    args: &Args,
    site: &GetComicsSite,
    cutoff: Option<chrono::NaiveDate>,
) -> Result<ExitCode> {
    let query = SearchQuery::new(&args.query, args.results, cutoff);

    let discovery = discover(site, &query).await;
    info!(
        pages = discovery.pages.len(),
        failed_pages = discovery.failed_pages.len(),
        cutoff_hit = discovery.cutoff_hit,
        "page discovery finished"
    );

    if discovery.pages.is_empty() {
        println!("No results found for '{}'.", args.query);
        return Ok(ExitCode::SUCCESS);
    }

    let link_report = resolve_links(site, &discovery.pages).await;

    if args.dry_run {
        output::print_dry_run(&discovery.pages, &link_report);
        return Ok(ExitCode::SUCCESS);
    }

    if link_report.links.is_empty() {
        println!("No download links found.");
        return Ok(ExitCode::SUCCESS);
    }

    let retry_policy = RetryPolicy::with_max_attempts(u32::from(args.max_retries));
    let mut engine = DownloadEngine::new(usize::from(args.concurrency), retry_policy)?;
    if args.confirm {
        engine = engine.with_confirm_gate(Arc::new(output::StdinConfirm));
    }
    if !args.quiet {
        engine = engine.with_progress(output::progress_factory(MultiProgress::new()));
    }

    let client = HttpClient::new();
    let report = engine
        .run_batch(&client, &link_report.links, &args.output)
        .await?;

    output::print_report(&report);

    Ok(if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
