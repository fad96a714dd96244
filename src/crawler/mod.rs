//! Concurrent discovery pipeline
//!
//! # Architecture
//!
//! ```text
//!   terms a..m            terms n..z
//!  ┌──────────┐          ┌──────────┐
//!  │ thread1  │          │ thread2  │   search workers
//!  └────┬─────┘          └────┬─────┘
//!       │ claim() under the DiscoveryStore lock
//!       ├──────────────┬──────┴─────────────┐
//!       ▼              ▼                    ▼
//!  discovery queue   persistence queue    relay (optional)
//!       │              ▲                    ▲
//!       ▼              │ update             │ connections
//!  ┌────────────────┐  │                    │
//!  │ related_thread │──┴────────────────────┘   expansion worker
//!  └────────────────┘
//! ```
//!
//! Expansion is one hop: referenced names never re-enter the discovery
//! queue. The queue closes when both search workers have dropped their
//! senders, which is how the expansion worker knows discovery is over.

pub mod context;
pub mod coordinator;
pub mod expand;
pub mod queue;
pub mod search;
pub mod state;

pub use context::WorkerContext;
pub use coordinator::{CrawlControl, CrawlCoordinator, CrawlProgress, CrawlResult, SEARCH_THREAD_NAMES};
pub use expand::{expand_community, extract_references, ExpansionExit, ExpansionStats, ExpansionWorker};
pub use queue::{discovery_channel, DiscoveryReceiver, DiscoverySender, Pop, QueueStats};
pub use search::{search_term, SearchStats, SearchWorker, TermOutcome};
pub use state::{DiscoveryStore, LastProcessed, StatusLine};
