//! Terminal output: dry-run listings, the final batch report, progress bars
//! and the interactive confirmation prompt.

use std::io::Write;
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use comicfetch_core::download::{BatchReport, ConfirmGate, ProgressFactory};
use comicfetch_core::links::{DownloadLink, LinkReport};
use comicfetch_core::ordered::OrderedMap;
use comicfetch_core::search::PageResult;

/// Renders a byte count as a human-readable size (1024-based units).
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Prints the discovered page map and resolved link map without downloading.
pub fn print_dry_run(pages: &OrderedMap<PageResult>, links: &LinkReport) {
    println!("\nPage links found:");
    for (i, (url, page)) in pages.iter().enumerate() {
        println!("{}) {}: {}", i + 1, page.title, url);
    }

    println!("\nComic links found:");
    for (i, (key, link)) in links.links.iter().enumerate() {
        println!("{}) {}: {}", i + 1, link.title, key);
    }

    for page in &links.empty_pages {
        println!("No download links found on {page}");
    }
}

/// Prints the outcome of a download batch.
pub fn print_report(report: &BatchReport) {
    for item in &report.completed {
        println!(
            "Saved '{}' to {} ({})",
            item.title,
            item.path.display(),
            format_bytes(item.bytes)
        );
    }

    for item in &report.manual {
        println!(
            "Please download '{}' manually from:\n{}",
            item.title, item.url
        );
    }

    for item in &report.skipped {
        println!("Skipped '{}'", item.title);
    }

    for item in &report.failed {
        eprintln!("Failed '{}' ({}): {}", item.title, item.url, item.error);
    }

    if !report.failed.is_empty() {
        eprintln!(
            "{} of {} downloads failed",
            report.failed.len(),
            report.total()
        );
    }
}

/// Per-item confirmation prompt on stdin; empty input means yes.
pub struct StdinConfirm;

impl ConfirmGate for StdinConfirm {
    fn confirm(&self, link: &DownloadLink) -> bool {
        eprint!("Download '{}'? [Y/n] ", link.title);
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        let answer = line.trim().to_ascii_lowercase();
        answer.is_empty() || answer == "y" || answer == "yes"
    }
}

/// Clears the bar when the download task drops its progress callback.
struct BarGuard(ProgressBar);

impl Drop for BarGuard {
    fn drop(&mut self) {
        self.0.finish_and_clear();
    }
}

/// Builds the engine progress hook: one bar per download under a shared
/// [`MultiProgress`], switching from a spinner to a sized bar once the
/// server declares a total.
pub fn progress_factory(multi: MultiProgress) -> Arc<ProgressFactory> {
    let unsized_style = ProgressStyle::with_template("{spinner} {msg} {bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let sized_style =
        ProgressStyle::with_template("{msg} [{bar:30}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar());

    Arc::new(
        move |link: &DownloadLink| -> Box<dyn Fn(u64, Option<u64>) + Send + Sync> {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(unsized_style.clone());
            bar.set_message(link.title.clone());

            let sized_style = sized_style.clone();
            let guard = BarGuard(bar.clone());
            Box::new(move |bytes, total| {
                let _ = &guard;
                if let Some(total) = total
                    && bar.length() != Some(total)
                {
                    bar.set_style(sized_style.clone());
                    bar.set_length(total);
                }
                bar.set_position(bytes);
            })
        },
    )
}
