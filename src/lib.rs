//! community-crawler - Concurrent Community Discovery Crawler
//!
//! Maps the community structure of a social network by running keyword
//! searches over a generated term space and following the `r/<name>`
//! cross-references found in community descriptions. Results are written
//! incrementally to a JSON graph store with periodic backups.
//!
//! # Features
//!
//! - **Split Term Space**: Two search threads each own one half of the
//!   terms, so no term is searched twice.
//!
//! - **Deduplicated Discovery**: A community is claimed exactly once under a
//!   single mutex, then expanded exactly once.
//!
//! - **Crash-Tolerant Store**: One writer thread owns the JSON file. Every
//!   write replaces the file atomically and every tenth also refreshes a
//!   `.backup` sibling.
//!
//! - **Optional Relay**: Discovery and connection events can be pushed onto a
//!   Redis list for an external graph consumer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Search / description API                         │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   ┌─────────┐  ┌─────────┐          ┌────────────────┐          │
//! │   │thread1  │  │thread2  │ ───────▶ │ related_thread │          │
//! │   └────┬────┘  └────┬────┘ discovery└───────┬────────┘          │
//! │        │            │        queue          │                   │
//! │        └────────────┼───────────────────────┘                   │
//! │                     ▼                                           │
//! │            ┌──────────────────────────┐                         │
//! │            │   Persistence thread     │ ──▶ Redis relay         │
//! │            └──────────────────────────┘     (optional)          │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────────┐
//!                    │ reddit_crawl_data.json   │
//!                    │ reddit_crawl_data.json.  │
//!                    │                  backup  │
//!                    └──────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Every one- and two-letter term, 25 results each
//! community-crawler -l 2 -n 25 -o crawl.json
//!
//! # Publish graph events to Redis as well
//! community-crawler --server --redis redis://127.0.0.1:6379/
//! ```

pub mod api;
pub mod config;
pub mod crawler;
pub mod error;
pub mod progress;
pub mod relay;
pub mod store;
pub mod terms;

pub use config::{CliArgs, CrawlConfig, TermSource};
pub use crawler::{CrawlControl, CrawlCoordinator, CrawlProgress, CrawlResult};
pub use error::{CrawlerError, Result};
