//! community-crawler - Concurrent Community Discovery Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use community_crawler::api::RedditClient;
use community_crawler::config::{CliArgs, CrawlConfig};
use community_crawler::crawler::CrawlCoordinator;
use community_crawler::progress::{print_header, print_summary, ProgressReporter};
use community_crawler::relay::{EventRelay, RedisRelay};
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose, args.log_file.as_deref())?;

    // Validate and create config
    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    let client = Arc::new(
        RedditClient::new(config.reddit_credentials()?).context("Failed to create API client")?,
    );

    if config.show_progress {
        print_header(&config);
    }

    // Create progress reporter
    let progress = config.show_progress.then(ProgressReporter::new);

    // The relay must be reachable before any worker starts
    let relay: Option<Arc<dyn EventRelay>> = match &config.relay {
        Some(relay_config) => {
            if let Some(reporter) = &progress {
                reporter.set_status(&format!("Connecting to relay at {}...", relay_config.url));
            }
            Some(Arc::new(
                RedisRelay::connect(relay_config.clone()).context("Failed to connect to relay")?,
            ))
        }
        None => None,
    };

    let coordinator = CrawlCoordinator::new(config.clone(), client.clone(), client, relay);

    // Setup signal handler for graceful shutdown
    let control = coordinator.control();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, flushing store...");
        control.request_stop();
    })
    .context("Failed to set signal handler")?;

    let result = coordinator
        .run_with_progress(|p| {
            if let Some(reporter) = &progress {
                reporter.update(p);
            }
        })
        .context("Crawl failed")?;

    // Finish progress
    if let Some(reporter) = &progress {
        if result.completed {
            reporter.finish("Crawl completed");
        } else {
            reporter.finish("Crawl stopped");
        }
    }

    if config.show_progress {
        print_summary(&result, &config.store_path);
    }

    if !result.completed {
        info!("Crawl was stopped before completion");
    }

    Ok(())
}

fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("community_crawler=debug,warn")
    } else {
        EnvFilter::new("community_crawler=info,warn")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}
