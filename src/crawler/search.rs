//! Search worker
//!
//! Each search worker owns one half of the term space. For every term it:
//! - asks the search collaborator for up to `limit` communities
//! - claims each unseen community in the discovery store
//! - queues a "new" persistence record and pushes the name for expansion
//! - publishes a relay event (best-effort)
//!
//! A failed lookup marks the term as errored and the worker moves on.

use crate::api::CommunitySearch;
use crate::crawler::context::WorkerContext;
use crate::crawler::queue::DiscoverySender;
use crate::error::{ApiResult, WorkerError};
use crate::relay::{publish_best_effort, RelayEvent};
use crate::store::CommunityRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Statistics collected by a search worker
#[derive(Debug, Default)]
pub struct SearchStats {
    /// Terms looked up successfully
    pub terms_searched: AtomicU64,

    /// Terms whose lookup failed
    pub term_errors: AtomicU64,

    /// Communities this worker claimed first
    pub communities_claimed: AtomicU64,

    /// Hits already claimed by someone else
    pub duplicates: AtomicU64,
}

impl SearchStats {
    pub fn terms_searched(&self) -> u64 {
        self.terms_searched.load(Ordering::Relaxed)
    }

    pub fn term_errors(&self) -> u64 {
        self.term_errors.load(Ordering::Relaxed)
    }

    pub fn communities_claimed(&self) -> u64 {
        self.communities_claimed.load(Ordering::Relaxed)
    }
}

/// A worker thread that searches its half of the term space
pub struct SearchWorker {
    /// Thread name, also the last-processed marker key
    name: String,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<SearchStats>,
}

impl SearchWorker {
    /// Spawn a new search worker thread
    pub fn spawn(
        name: &str,
        terms: Vec<String>,
        limit: usize,
        search: Arc<dyn CommunitySearch>,
        discovery: DiscoverySender,
        ctx: WorkerContext,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(SearchStats::default());
        let stats_clone = Arc::clone(&stats);
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                search_loop(&thread_name, terms, limit, search.as_ref(), &discovery, &ctx, &stats_clone)
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            stats,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Whether the thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                name: self.name.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Main search loop; the discovery sender is dropped when it returns
fn search_loop(
    thread_name: &str,
    terms: Vec<String>,
    limit: usize,
    search: &dyn CommunitySearch,
    discovery: &DiscoverySender,
    ctx: &WorkerContext,
    stats: &SearchStats,
) {
    info!(worker = thread_name, terms = terms.len(), "Search worker starting");

    for term in &terms {
        if !ctx.is_running() {
            info!(worker = thread_name, "Stop requested");
            break;
        }

        match search_term(thread_name, term, limit, search, discovery, ctx) {
            Ok(outcome) => {
                stats.terms_searched.fetch_add(1, Ordering::Relaxed);
                stats.communities_claimed.fetch_add(outcome.claimed, Ordering::Relaxed);
                stats.duplicates.fetch_add(outcome.duplicates, Ordering::Relaxed);
            }
            Err(e) => {
                stats.term_errors.fetch_add(1, Ordering::Relaxed);
                ctx.store.mark_errored(thread_name, term);
                error!(worker = thread_name, term = %term, error = %e, "Search failed");
            }
        }
    }

    info!(
        worker = thread_name,
        searched = stats.terms_searched(),
        claimed = stats.communities_claimed(),
        errors = stats.term_errors(),
        "Search worker finished"
    );
}

/// Counts for one term
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TermOutcome {
    /// Communities newly claimed by this term
    pub claimed: u64,

    /// Hits that were already claimed
    pub duplicates: u64,
}

/// Search one term and dispatch every community it is first to find
pub fn search_term(
    thread_name: &str,
    term: &str,
    limit: usize,
    search: &dyn CommunitySearch,
    discovery: &DiscoverySender,
    ctx: &WorkerContext,
) -> ApiResult<TermOutcome> {
    ctx.status.set(format!("Searching '{}' in {}", term, thread_name));
    debug!(worker = thread_name, term = %term, "Starting search");

    let hits = search.search(term, limit)?;
    let mut outcome = TermOutcome::default();

    for hit in hits {
        if !ctx.is_running() {
            break;
        }

        let record = CommunityRecord::discovered(hit.name.clone(), hit.is_restricted);

        if !ctx.store.claim(&hit.name) {
            outcome.duplicates += 1;
            continue;
        }
        outcome.claimed += 1;

        if let Err(e) = ctx.persist.send_new(term, record) {
            error!(worker = thread_name, name = %hit.name, error = %e, "Failed to queue new community");
        }

        if let Err(e) = discovery.push(hit.name.clone()) {
            error!(worker = thread_name, name = %hit.name, error = %e, "Failed to queue community for expansion");
        }

        publish_best_effort(
            ctx.relay(),
            &RelayEvent::discovered(&hit.name, hit.is_restricted, term),
        );
    }

    ctx.store.mark_processed(thread_name, term);
    debug!(
        worker = thread_name,
        term = %term,
        claimed = outcome.claimed,
        duplicates = outcome.duplicates,
        "Search complete"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SearchHit;
    use crate::crawler::queue::{discovery_channel, Pop};
    use crate::crawler::state::{DiscoveryStore, LastProcessed, StatusLine};
    use crate::error::ApiError;
    use crate::store::PersistenceManager;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FixedSearch;

    impl CommunitySearch for FixedSearch {
        fn search(&self, term: &str, limit: usize) -> ApiResult<Vec<SearchHit>> {
            match term {
                "bad" => Err(ApiError::Transport("connection reset".into())),
                _ => Ok(vec![SearchHit::new("X", false), SearchHit::new("Y", true)]
                    .into_iter()
                    .take(limit)
                    .collect()),
            }
        }
    }

    fn context(manager: &PersistenceManager) -> WorkerContext {
        WorkerContext {
            store: Arc::new(DiscoveryStore::new()),
            persist: manager.handle(),
            relay: None,
            running: Arc::new(AtomicBool::new(true)),
            status: Arc::new(StatusLine::new("")),
        }
    }

    #[test]
    fn test_search_term_claims_once() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, rx) = discovery_channel();

        let first = search_term("thread1", "abc", 10, &FixedSearch, &tx, &ctx).unwrap();
        assert_eq!(first, TermOutcome { claimed: 2, duplicates: 0 });

        let second = search_term("thread1", "abd", 10, &FixedSearch, &tx, &ctx).unwrap();
        assert_eq!(second, TermOutcome { claimed: 0, duplicates: 2 });

        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Item("X".into()));
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Item("Y".into()));
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Idle);
        assert_eq!(ctx.store.last_processed("thread1"), Some(LastProcessed::Term("abd".into())));

        manager.finish().unwrap();
    }

    #[test]
    fn test_search_respects_limit() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, _rx) = discovery_channel();

        let outcome = search_term("thread1", "abc", 1, &FixedSearch, &tx, &ctx).unwrap();
        assert_eq!(outcome.claimed, 1);
        assert!(!ctx.store.is_processed("Y"));

        manager.finish().unwrap();
    }

    #[test]
    fn test_worker_continues_after_failure() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, rx) = discovery_channel();

        let worker = SearchWorker::spawn(
            "thread1",
            vec!["bad".into(), "abc".into()],
            10,
            Arc::new(FixedSearch),
            tx,
            ctx.clone(),
        )
        .unwrap();
        let stats = Arc::clone(&worker.stats);
        worker.join().unwrap();

        assert_eq!(stats.term_errors(), 1);
        assert_eq!(stats.terms_searched(), 1);
        assert_eq!(stats.communities_claimed(), 2);
        assert_eq!(rx.len(), 2);

        manager.finish().unwrap();
    }

    #[test]
    fn test_errored_marker() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, _rx) = discovery_channel();

        let worker =
            SearchWorker::spawn("thread2", vec!["bad".into()], 10, Arc::new(FixedSearch), tx, ctx.clone())
                .unwrap();
        worker.join().unwrap();

        assert_eq!(ctx.store.last_processed("thread2"), Some(LastProcessed::Errored("bad".into())));
        manager.finish().unwrap();
    }

    #[test]
    fn test_stopped_worker_searches_nothing() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        ctx.running.store(false, Ordering::SeqCst);
        let (tx, rx) = discovery_channel();

        let worker =
            SearchWorker::spawn("thread1", vec!["abc".into()], 10, Arc::new(FixedSearch), tx, ctx.clone())
                .unwrap();
        worker.join().unwrap();

        assert!(rx.is_empty());
        assert_eq!(ctx.store.processed_count(), 0);
        manager.finish().unwrap();
    }
}
