//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::config::CrawlConfig;
use crate::crawler::{CrawlProgress, CrawlResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &CrawlProgress) {
        let msg = format!(
            "Terms: {}/{} | Found: {} | Expanded: {} | Queue: {} | Writes: {} | Rate: {:.1}/s | {}",
            format_number(progress.terms_searched),
            format_number(progress.total_terms as u64),
            format_number(progress.discovered),
            format_number(progress.expanded),
            progress.queued,
            format_number(progress.writes),
            progress.communities_per_second(),
            progress.status,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the crawl results
pub fn print_summary(result: &CrawlResult, store_path: &Path) {
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        result.communities_discovered as f64 / duration_secs
    } else {
        0.0
    };

    let title = if result.completed {
        style("Crawl Complete").green().bold()
    } else {
        style("Crawl Stopped").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Terms:").bold(),
        format_number(result.terms_searched)
    );
    println!(
        "  {} {}",
        style("Communities:").bold(),
        format_number(result.communities_discovered)
    );
    println!(
        "  {} {} ({} skipped)",
        style("Expanded:").bold(),
        format_number(result.communities_expanded),
        format_number(result.expansion_skipped)
    );
    println!("  {} {}", style("Edges:").bold(), format_number(result.edges as u64));
    println!(
        "  {} {:.1}s ({:.1} communities/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );

    let errors = result.term_errors + result.expansion_errors + result.write_failures;
    if errors > 0 {
        println!(
            "  {} {} (search {}, expansion {}, store {})",
            style("Errors:").yellow().bold(),
            format_number(errors),
            result.term_errors,
            result.expansion_errors,
            result.write_failures
        );
    }

    // Show store path with size if available
    match std::fs::metadata(store_path) {
        Ok(meta) => println!(
            "  {} {} ({}, {} writes, {} backups)",
            style("Store:").bold(),
            store_path.display(),
            format_size(meta.len(), BINARY),
            format_number(result.writes),
            result.backups
        ),
        Err(_) => println!("  {} {}", style("Store:").bold(), store_path.display()),
    }
    println!();
}

/// Print a header at the start of the crawl
pub fn print_header(config: &CrawlConfig) {
    println!();
    println!(
        "{} {}",
        style("community-crawler").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Terms:").bold(),
        format_number(config.term_count() as u64)
    );
    println!("  {} {}", style("Limit:").bold(), config.search_limit);
    println!("  {} {}", style("Store:").bold(), config.store_path.display());
    if let Some(relay) = &config.relay {
        println!("  {} {} ({})", style("Relay:").bold(), relay.url, relay.queue_name);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_status_then_finish() {
        let reporter = ProgressReporter {
            bar: ProgressBar::hidden(),
        };
        reporter.set_status("Connecting to relay...");
        assert_eq!(reporter.bar.message(), "Connecting to relay...");

        reporter.finish("Crawl stopped");
        assert!(reporter.bar.is_finished());
        assert_eq!(reporter.bar.message(), "Crawl stopped");
    }
}
