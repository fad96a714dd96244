//! Crawl coordinator - orchestrates one discovery session
//!
//! The coordinator is responsible for:
//! - Materializing and splitting the term space
//! - Starting the persistence thread, two search workers and the expansion worker
//! - Progress reporting and stop handling
//! - Draining persistence, closing the relay and tearing down in-memory state

use crate::api::{CommunitySearch, DescriptionSource};
use crate::config::CrawlConfig;
use crate::crawler::context::WorkerContext;
use crate::crawler::expand::ExpansionWorker;
use crate::crawler::queue::{discovery_channel, DiscoveryReceiver};
use crate::crawler::search::SearchWorker;
use crate::crawler::state::{DiscoveryStore, StatusLine};
use crate::error::{ConfigError, Result};
use crate::relay::EventRelay;
use crate::store::{PersistHandle, PersistenceManager};
use crate::terms::split_halves;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Names of the two search threads, also their last-processed marker keys
pub const SEARCH_THREAD_NAMES: [&str; 2] = ["thread1", "thread2"];

/// Result of a finished crawl session
#[derive(Debug)]
pub struct CrawlResult {
    /// Terms looked up successfully
    pub terms_searched: u64,

    /// Terms whose lookup failed
    pub term_errors: u64,

    /// Distinct communities claimed by the search workers
    pub communities_discovered: u64,

    /// Communities whose description was expanded
    pub communities_expanded: u64,

    /// Communities skipped during expansion
    pub expansion_skipped: u64,

    /// Description fetch failures
    pub expansion_errors: u64,

    /// Undirected edges in the reference graph
    pub edges: usize,

    /// Reference graph at the end of the session
    pub adjacency: HashMap<String, HashMap<String, u64>>,

    /// Successful store writes
    pub writes: u64,

    /// Backups written
    pub backups: u64,

    /// Abandoned write cycles
    pub write_failures: u64,

    /// Session duration
    pub duration: Duration,

    /// Whether the crawl ran to the end (vs was stopped)
    pub completed: bool,
}

/// Stop handle for a running crawl
#[derive(Clone)]
pub struct CrawlControl {
    running: Arc<AtomicBool>,
}

impl CrawlControl {
    /// Ask every worker to stop at its next loop boundary
    ///
    /// `run` then joins the workers and flushes the persistence queue
    /// before returning.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Coordinates one crawl session
pub struct CrawlCoordinator {
    /// Configuration
    config: Arc<CrawlConfig>,

    /// Search collaborator
    search: Arc<dyn CommunitySearch>,

    /// Description collaborator
    descriptions: Arc<dyn DescriptionSource>,

    /// Optional relay
    relay: Option<Arc<dyn EventRelay>>,

    /// Shared discovery state
    store: Arc<DiscoveryStore>,

    /// Running flag (cleared to stop)
    running: Arc<AtomicBool>,

    /// Current activity line
    status: Arc<StatusLine>,
}

impl CrawlCoordinator {
    /// Create a new crawl coordinator
    pub fn new(
        config: CrawlConfig,
        search: Arc<dyn CommunitySearch>,
        descriptions: Arc<dyn DescriptionSource>,
        relay: Option<Arc<dyn EventRelay>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            search,
            descriptions,
            relay,
            store: Arc::new(DiscoveryStore::new()),
            running: Arc::new(AtomicBool::new(true)),
            status: Arc::new(StatusLine::new("Starting")),
        }
    }

    /// Get a stop handle
    pub fn control(&self) -> CrawlControl {
        CrawlControl {
            running: Arc::clone(&self.running),
        }
    }

    /// Shared discovery state (cleared when `run` returns)
    pub fn discovery_store(&self) -> Arc<DiscoveryStore> {
        Arc::clone(&self.store)
    }

    /// Run the crawl
    pub fn run(self) -> Result<CrawlResult> {
        self.run_with_progress(|_| {})
    }

    /// Run the crawl, calling `progress_callback` every 100ms
    pub fn run_with_progress<F>(mut self, mut progress_callback: F) -> Result<CrawlResult>
    where
        F: FnMut(&CrawlProgress),
    {
        let start_time = Instant::now();

        let terms = self.config.search_terms();
        if terms.is_empty() {
            return Err(ConfigError::EmptyTermSpace.into());
        }
        let total_terms = terms.len();

        info!(
            terms = total_terms,
            limit = self.config.search_limit,
            store = %self.config.store_path.display(),
            relay = self.relay.is_some(),
            "Starting crawl"
        );

        let persistence =
            PersistenceManager::new(&self.config.store_path, self.config.backup_frequency)?;
        let persist = persistence.handle();

        let ctx = WorkerContext {
            store: Arc::clone(&self.store),
            persist: persist.clone(),
            relay: self.relay.clone(),
            running: Arc::clone(&self.running),
            status: Arc::clone(&self.status),
        };

        let (discovery_tx, discovery_rx) = discovery_channel();
        let (first_half, second_half) = split_halves(terms);

        let mut searchers = Vec::with_capacity(SEARCH_THREAD_NAMES.len());
        for (name, half) in SEARCH_THREAD_NAMES.into_iter().zip([first_half, second_half]) {
            let worker = SearchWorker::spawn(
                name,
                half,
                self.config.search_limit,
                Arc::clone(&self.search),
                discovery_tx.clone(),
                ctx.clone(),
            );
            match worker {
                Ok(worker) => searchers.push(worker),
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    drop(discovery_tx);
                    for worker in searchers {
                        let _ = worker.join();
                    }
                    let _ = persistence.finish();
                    return Err(e.into());
                }
            }
        }
        // Only the search workers may hold senders, so the queue closes when both finish
        drop(discovery_tx);

        let expander = match ExpansionWorker::spawn(
            discovery_rx.clone(),
            Arc::clone(&self.descriptions),
            ctx,
            self.config.expansion_timeout,
            self.config.expansion_exit,
        ) {
            Ok(expander) => expander,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                for worker in searchers {
                    let _ = worker.join();
                }
                let _ = persistence.finish();
                return Err(e.into());
            }
        };

        info!(count = searchers.len() + 1, "Workers spawned");

        let completed = self.wait_for_completion(
            &searchers,
            &expander,
            &discovery_rx,
            &persist,
            total_terms,
            start_time,
            &mut progress_callback,
        );

        if !completed {
            self.running.store(false, Ordering::SeqCst);
        }

        // Collect stats, then join
        let mut terms_searched = 0;
        let mut term_errors = 0;
        let mut communities_discovered = 0;
        for worker in searchers {
            terms_searched += worker.stats().terms_searched();
            term_errors += worker.stats().term_errors();
            communities_discovered += worker.stats().communities_claimed();
            let name = worker.name().to_string();
            if let Err(e) = worker.join() {
                warn!(worker = %name, error = %e, "Worker failed to join cleanly");
            }
        }

        let communities_expanded = expander.stats().expanded();
        let expansion_skipped = expander.stats().skipped();
        let expansion_errors = expander.stats().errors();
        if let Err(e) = expander.join() {
            warn!(error = %e, "Expansion worker failed to join cleanly");
        }

        self.status.set("Flushing store".into());
        if let Err(e) = persistence.finish() {
            warn!(error = %e, "Persistence manager did not stop cleanly");
        }

        self.close_relay();

        let adjacency = self.store.adjacency_snapshot();
        let edges = self.store.edge_count();
        let duration = start_time.elapsed();

        // Session teardown
        let dropped = discovery_rx.drain();
        if dropped > 0 {
            info!(dropped, "Discarded unexpanded communities");
        }
        self.store.clear();

        info!(
            searched = terms_searched,
            discovered = communities_discovered,
            expanded = communities_expanded,
            edges,
            duration_secs = duration.as_secs(),
            completed,
            "Crawl finished"
        );

        Ok(CrawlResult {
            terms_searched,
            term_errors,
            communities_discovered,
            communities_expanded,
            expansion_skipped,
            expansion_errors,
            edges,
            adjacency,
            writes: persist.stats().writes_completed(),
            backups: persist.stats().backups_written(),
            write_failures: persist.stats().failed_cycles(),
            duration,
            completed,
        })
    }

    /// Clear the relay queue and release it (at most once)
    fn close_relay(&mut self) {
        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.close() {
                warn!(error = %e, "Failed to close relay");
            }
        }
    }

    /// Wait until every worker exits or a stop is requested
    ///
    /// Returns true if the workers ran to the end.
    #[allow(clippy::too_many_arguments)]
    fn wait_for_completion<F>(
        &self,
        searchers: &[SearchWorker],
        expander: &ExpansionWorker,
        discovery: &DiscoveryReceiver,
        persist: &PersistHandle,
        total_terms: usize,
        start_time: Instant,
        progress_callback: &mut F,
    ) -> bool
    where
        F: FnMut(&CrawlProgress),
    {
        let check_interval = Duration::from_millis(100);

        loop {
            let searched: u64 = searchers
                .iter()
                .map(|w| w.stats().terms_searched() + w.stats().term_errors())
                .sum();
            let discovered: u64 = searchers.iter().map(|w| w.stats().communities_claimed()).sum();
            let errors: u64 = searchers.iter().map(|w| w.stats().term_errors()).sum::<u64>()
                + expander.stats().errors();

            progress_callback(&CrawlProgress {
                terms_searched: searched,
                total_terms,
                discovered,
                expanded: expander.stats().expanded(),
                queued: discovery.len(),
                pending_writes: persist.pending(),
                writes: persist.stats().writes_completed(),
                errors,
                status: self.status.get(),
                elapsed: start_time.elapsed(),
            });

            if !self.running.load(Ordering::SeqCst) {
                info!("Stop requested");
                return false;
            }

            if searchers.iter().all(SearchWorker::is_finished) && expander.is_finished() {
                return true;
            }

            thread::sleep(check_interval);
        }
    }
}

impl Drop for CrawlCoordinator {
    fn drop(&mut self) {
        // Covers early returns and a coordinator that never ran
        self.close_relay();
    }
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct CrawlProgress {
    /// Terms looked up (including failures)
    pub terms_searched: u64,

    /// Terms in the session
    pub total_terms: usize,

    /// Communities claimed
    pub discovered: u64,

    /// Communities expanded
    pub expanded: u64,

    /// Names waiting for expansion
    pub queued: usize,

    /// Store messages waiting
    pub pending_writes: usize,

    /// Successful store writes
    pub writes: u64,

    /// Search and expansion failures
    pub errors: u64,

    /// Current activity
    pub status: String,

    /// Elapsed time
    pub elapsed: Duration,
}

impl CrawlProgress {
    /// Calculate terms per second rate
    pub fn terms_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.terms_searched as f64 / secs
        } else {
            0.0
        }
    }

    /// Calculate discovered communities per second rate
    pub fn communities_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.discovered as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of the term space searched, in `0.0..=1.0`
    pub fn fraction_searched(&self) -> f64 {
        if self.total_terms == 0 {
            return 1.0;
        }
        (self.terms_searched as f64 / self.total_terms as f64).min(1.0)
    }
}
