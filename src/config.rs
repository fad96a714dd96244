//! Configuration types for community-crawler
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros (with env fallbacks)
//! - Runtime configuration with validation

use crate::api::RedditCredentials;
use crate::crawler::ExpansionExit;
use crate::error::ConfigError;
use crate::relay::{RedisRelayConfig, GRAPH_QUEUE_KEY};
use crate::store::DEFAULT_BACKUP_FREQUENCY;
use crate::terms::SearchTerms;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Longest generated search term (26^5 terms is already ~12M lookups)
pub const MAX_TERM_LENGTH: usize = 5;

/// Upper bound the search endpoint accepts for `limit`
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Default wait on an empty discovery queue
pub const DEFAULT_EXPANSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Discover communities by keyword search and map their cross-references
#[derive(Parser, Debug, Clone)]
#[command(
    name = "community-crawler",
    version,
    about = "Discover communities by keyword search and map their cross-references",
    long_about = "Searches every lowercase term up to --term-length characters, splits the \
                  term space between two search threads and expands each new community by \
                  following r/<name> references in its description.\n\n\
                  Results are written incrementally to a JSON store with a periodic backup.",
    after_help = "EXAMPLES:\n    \
        community-crawler -l 2 -o crawl.json\n    \
        community-crawler --terms rust,go,zig --limit 25\n    \
        community-crawler --server --redis redis://127.0.0.1:6379/"
)]
pub struct CliArgs {
    /// Maximum length of generated search terms
    #[arg(short = 'l', long, env = "SEARCH_TERM_LENGTH", default_value = "1", value_name = "NUM")]
    pub term_length: usize,

    /// Explicit search terms (comma separated) instead of the generated space
    #[arg(long, value_delimiter = ',', value_name = "TERM")]
    pub terms: Vec<String>,

    /// Communities requested per search term
    #[arg(short = 'n', long, env = "SEARCH_LIMIT", default_value = "10", value_name = "NUM")]
    pub limit: usize,

    /// JSON store file
    #[arg(
        short,
        long,
        env = "SAVE_DATA_PATH",
        default_value = "reddit_crawl_data.json",
        value_name = "FILE"
    )]
    pub output: PathBuf,

    /// Write a backup every N successful store writes
    #[arg(long, default_value_t = DEFAULT_BACKUP_FREQUENCY, value_name = "NUM")]
    pub backup_every: u64,

    /// Publish events to the Redis relay
    #[arg(long)]
    pub server: bool,

    /// Redis URL for the relay
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379/", value_name = "URL")]
    pub redis: String,

    /// Redis list the relay pushes onto
    #[arg(long, default_value = GRAPH_QUEUE_KEY, value_name = "NAME")]
    pub relay_queue: String,

    /// API client id
    #[arg(long, env = "REDDIT_CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// API client secret
    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// User agent sent with every API request
    #[arg(long, env = "REDDIT_USER_AGENT", default_value = "MyRedditCrawler v1.0")]
    pub user_agent: String,

    /// Seconds the expansion thread waits on an empty queue
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub expansion_timeout: u64,

    /// End expansion after one idle timeout instead of waiting for the search threads
    #[arg(long)]
    pub expansion_idle_exit: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "CRAWLER_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Where the search terms come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermSource {
    /// Every lowercase term up to this length
    Generated(usize),

    /// A caller-supplied list
    Explicit(Vec<String>),
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Search terms to crawl
    pub terms: TermSource,

    /// Communities requested per term
    pub search_limit: usize,

    /// JSON store path
    pub store_path: PathBuf,

    /// Backup cadence in successful writes
    pub backup_frequency: u64,

    /// Relay settings, if the relay is enabled
    pub relay: Option<RedisRelayConfig>,

    /// API credentials, if supplied
    pub credentials: Option<RedditCredentials>,

    /// Expansion queue pop timeout
    pub expansion_timeout: Duration,

    /// Expansion termination rule
    pub expansion_exit: ExpansionExit,

    /// Log file path
    pub log_file: Option<PathBuf>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let terms: Vec<String> = args
            .terms
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let terms = if terms.is_empty() {
            if args.term_length == 0 || args.term_length > MAX_TERM_LENGTH {
                return Err(ConfigError::InvalidTermLength {
                    length: args.term_length,
                    max: MAX_TERM_LENGTH,
                });
            }
            TermSource::Generated(args.term_length)
        } else {
            TermSource::Explicit(terms)
        };

        if args.limit == 0 || args.limit > MAX_SEARCH_LIMIT {
            return Err(ConfigError::InvalidSearchLimit {
                limit: args.limit,
                max: MAX_SEARCH_LIMIT,
            });
        }

        if args.backup_every == 0 {
            return Err(ConfigError::InvalidBackupFrequency(args.backup_every));
        }

        // Validate output path
        if let Some(parent) = args.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::InvalidStorePath {
                    path: args.output.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }
        if args.output.is_dir() {
            return Err(ConfigError::InvalidStorePath {
                path: args.output.clone(),
                reason: "Path is a directory".into(),
            });
        }

        let relay = args.server.then(|| RedisRelayConfig {
            queue_name: args.relay_queue.clone(),
            ..RedisRelayConfig::with_url(&args.redis)
        });

        let credentials = match (args.client_id, args.client_secret) {
            (Some(client_id), Some(client_secret)) => Some(RedditCredentials {
                client_id,
                client_secret,
                user_agent: args.user_agent,
            }),
            _ => None,
        };

        Ok(Self {
            terms,
            search_limit: args.limit,
            store_path: args.output,
            backup_frequency: args.backup_every,
            relay,
            credentials,
            expansion_timeout: Duration::from_secs(args.expansion_timeout),
            expansion_exit: if args.expansion_idle_exit {
                ExpansionExit::IdleTimeout
            } else {
                ExpansionExit::SearchersDone
            },
            log_file: args.log_file,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Configuration with defaults for everything but the store path
    pub fn with_store_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            terms: TermSource::Generated(1),
            search_limit: 10,
            store_path: store_path.into(),
            backup_frequency: DEFAULT_BACKUP_FREQUENCY,
            relay: None,
            credentials: None,
            expansion_timeout: DEFAULT_EXPANSION_TIMEOUT,
            expansion_exit: ExpansionExit::SearchersDone,
            log_file: None,
            show_progress: false,
            verbose: false,
        }
    }

    /// Materialize the term space
    pub fn search_terms(&self) -> Vec<String> {
        match &self.terms {
            TermSource::Generated(length) => SearchTerms::new(*length).collect(),
            TermSource::Explicit(terms) => terms.clone(),
        }
    }

    /// Number of terms the crawl will search
    pub fn term_count(&self) -> usize {
        match &self.terms {
            TermSource::Generated(length) => SearchTerms::total(*length),
            TermSource::Explicit(terms) => terms.len(),
        }
    }

    /// API credentials, required by the HTTP collaborator
    pub fn reddit_credentials(&self) -> Result<RedditCredentials, ConfigError> {
        self.credentials.clone().ok_or_else(|| {
            ConfigError::MissingRequired("REDDIT_CLIENT_ID and REDDIT_CLIENT_SECRET".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["community-crawler"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("crawl.json");
        let args = parse(&["-o", out.to_str().unwrap()]);
        let config = CrawlConfig::from_args(args).unwrap();

        assert_eq!(config.search_limit, 10);
        assert_eq!(config.backup_frequency, 10);
        assert_eq!(config.term_count(), 26);
        assert_eq!(config.expansion_timeout, Duration::from_secs(10));
        assert_eq!(config.expansion_exit, ExpansionExit::SearchersDone);
        assert!(config.relay.is_none());
        assert!(config.show_progress);
    }

    #[test]
    fn test_explicit_terms() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("crawl.json");
        let args = parse(&["-o", out.to_str().unwrap(), "--terms", "rust, go,,zig"]);
        let config = CrawlConfig::from_args(args).unwrap();

        assert_eq!(config.search_terms(), vec!["rust", "go", "zig"]);
        assert_eq!(config.term_count(), 3);
    }

    #[test]
    fn test_invalid_values() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("crawl.json");
        let out = out.to_str().unwrap();

        let err = CrawlConfig::from_args(parse(&["-o", out, "-l", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTermLength { length: 0, .. }));

        let err = CrawlConfig::from_args(parse(&["-o", out, "-l", "6"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTermLength { length: 6, .. }));

        let err = CrawlConfig::from_args(parse(&["-o", out, "-n", "101"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSearchLimit { limit: 101, .. }));

        let err = CrawlConfig::from_args(parse(&["-o", out, "--backup-every", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBackupFrequency(0)));
    }

    #[test]
    fn test_missing_parent_directory() {
        let err = CrawlConfig::from_args(parse(&["-o", "/nonexistent/dir/crawl.json"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStorePath { .. }));
    }

    #[test]
    fn test_relay_enabled() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("crawl.json");
        let args = parse(&[
            "-o",
            out.to_str().unwrap(),
            "--server",
            "--redis",
            "redis://cache:6380/",
            "--relay-queue",
            "graph",
        ]);
        let relay = CrawlConfig::from_args(args).unwrap().relay.unwrap();

        assert_eq!(relay.url, "redis://cache:6380/");
        assert_eq!(relay.queue_name, "graph");
    }

    #[test]
    fn test_credentials_required() {
        let config = CrawlConfig::with_store_path("crawl.json");
        assert!(matches!(
            config.reddit_credentials(),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
