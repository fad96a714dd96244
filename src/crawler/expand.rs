//! Expansion worker
//!
//! Pops community names from the discovery queue, fetches each
//! description and extracts `r/<name>` cross-references. References are
//! recorded as symmetric adjacency edges and sent to the store as an
//! update of the source community.
//!
//! Expansion is one hop only: referenced communities are never pushed back
//! onto the discovery queue.

use crate::api::DescriptionSource;
use crate::crawler::context::WorkerContext;
use crate::crawler::queue::{DiscoveryReceiver, Pop};
use crate::error::{ExpandOutcome, WorkerError};
use crate::relay::{publish_best_effort, RelayEvent};
use crate::store::CommunityUpdate;
use indexmap::IndexSet;
use regex::Regex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Community reference: `r/name` or `/r/name` at the start or after whitespace
static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?:/?r/|/r/)([a-zA-Z0-9_]+)").expect("Invalid reference regex")
});

/// How the expansion worker decides the discovery phase is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionExit {
    /// Stop once every search worker has finished and the queue is drained
    SearchersDone,

    /// Stop after one pop timeout with an empty queue
    IdleTimeout,
}

/// Statistics collected by the expansion worker
#[derive(Debug, Default)]
pub struct ExpansionStats {
    /// Communities whose description was processed
    pub expanded: AtomicU64,

    /// Communities skipped (not public, not found, private)
    pub skipped: AtomicU64,

    /// Fetch failures
    pub errors: AtomicU64,

    /// References recorded
    pub references: AtomicU64,
}

impl ExpansionStats {
    pub fn expanded(&self) -> u64 {
        self.expanded.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// The worker thread draining the discovery queue
pub struct ExpansionWorker {
    handle: Option<JoinHandle<()>>,
    stats: Arc<ExpansionStats>,
}

impl ExpansionWorker {
    /// Spawn the expansion thread
    pub fn spawn(
        queue: DiscoveryReceiver,
        descriptions: Arc<dyn DescriptionSource>,
        ctx: WorkerContext,
        pop_timeout: Duration,
        exit: ExpansionExit,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(ExpansionStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("related_thread".into())
            .spawn(move || {
                expansion_loop(&queue, descriptions.as_ref(), &ctx, pop_timeout, exit, &stats_clone)
            })
            .map_err(|e| WorkerError::SpawnFailed {
                name: "related_thread".into(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            handle: Some(handle),
            stats,
        })
    }

    pub fn stats(&self) -> &ExpansionStats {
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
                name: "related_thread".into(),
            }),
            None => Ok(()),
        }
    }
}

fn expansion_loop(
    queue: &DiscoveryReceiver,
    descriptions: &dyn DescriptionSource,
    ctx: &WorkerContext,
    pop_timeout: Duration,
    exit: ExpansionExit,
    stats: &ExpansionStats,
) {
    info!(?exit, "Expansion worker starting");

    while ctx.is_running() {
        let name = match queue.pop(pop_timeout) {
            Pop::Item(name) => name,
            Pop::Idle if exit == ExpansionExit::IdleTimeout => {
                info!("Discovery queue idle, ending expansion");
                break;
            }
            Pop::Idle => continue,
            Pop::Closed => {
                info!("Discovery queue drained and closed, ending expansion");
                break;
            }
        };

        match expand_community(&name, descriptions, ctx) {
            ExpandOutcome::Expanded { name, references } => {
                stats.expanded.fetch_add(1, Ordering::Relaxed);
                stats.references.fetch_add(references as u64, Ordering::Relaxed);
                trace!(name = %name, references, "Community expanded");
            }
            ExpandOutcome::Skipped { name, reason } => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(name = %name, reason = %reason, "Community skipped");
            }
            ExpandOutcome::Failed { name, error } => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(name = %name, error = %error, "Failed to find related communities");
            }
        }
    }

    info!(
        expanded = stats.expanded(),
        skipped = stats.skipped(),
        errors = stats.errors(),
        "Expansion worker finished"
    );
}

/// Fetch one community's description and record its references
pub fn expand_community(
    name: &str,
    descriptions: &dyn DescriptionSource,
    ctx: &WorkerContext,
) -> ExpandOutcome {
    ctx.status.set(format!("Expanding related communities of '{}'", name));

    let description = match descriptions.get_description(name) {
        Ok(description) => description,
        Err(e) if e.is_skip() => {
            return ExpandOutcome::Skipped {
                name: name.to_string(),
                reason: e.to_string(),
            }
        }
        Err(e) => {
            return ExpandOutcome::Failed {
                name: name.to_string(),
                error: e,
            }
        }
    };

    if !description.is_public {
        return ExpandOutcome::Skipped {
            name: name.to_string(),
            reason: "not public".into(),
        };
    }

    let references = extract_references(&description.description_text, name);

    if !references.is_empty() {
        let update = CommunityUpdate::new(name, references.clone(), description.is_restricted);
        if let Err(e) = ctx.persist.send_update(update) {
            error!(name = %name, error = %e, "Failed to queue community update");
        }

        publish_best_effort(
            ctx.relay(),
            &RelayEvent::connections(name, references.clone(), description.is_restricted),
        );
    }

    // Always paired with the update above, even if a stop arrived mid-item
    ctx.store.record_references(name, &references);

    ExpandOutcome::Expanded {
        name: name.to_string(),
        references: references.len(),
    }
}

/// Distinct community references in `text`, in order of first appearance
///
/// Matching is case-sensitive. A reference to `source` itself is dropped.
pub fn extract_references(text: &str, source: &str) -> Vec<String> {
    let mut found: IndexSet<&str> = REFERENCE_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    found.shift_remove(source);
    found.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::CommunityDescription;
    use crate::crawler::queue::discovery_channel;
    use crate::crawler::state::{DiscoveryStore, StatusLine};
    use crate::error::{ApiError, ApiResult};
    use crate::store::{load_document, CommunityRecord, PersistenceManager};
    use std::sync::atomic::AtomicBool;
    use tempfile::tempdir;

    struct Descriptions;

    impl DescriptionSource for Descriptions {
        fn get_description(&self, name: &str) -> ApiResult<CommunityDescription> {
            let public = |text: &str| {
                Ok(CommunityDescription {
                    description_text: text.to_string(),
                    is_public: true,
                    is_restricted: false,
                })
            };
            match name {
                "X" => public("Friends: r/Y and /r/X, see also r/Y again"),
                "Quiet" => public("no references here"),
                "Hidden" => Ok(CommunityDescription {
                    description_text: "r/Y".into(),
                    is_public: false,
                    is_restricted: false,
                }),
                "Locked" => Err(ApiError::Private { name: name.into() }),
                _ => Err(ApiError::Transport("timeout".into())),
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
    fn test_extract_references() {
        let refs = extract_references("Try r/rust, /r/learnrust and r/rust_gamedev. r/rust", "x");
        assert_eq!(refs, vec!["rust", "learnrust", "rust_gamedev"]);
    }

    #[test]
    fn test_extract_requires_boundary() {
        // Not preceded by whitespace or string start
        assert!(extract_references("see:r/rust and xr/go", "x").is_empty());
        assert_eq!(extract_references("r/first\tr/second", "x"), vec!["first", "second"]);
    }

    #[test]
    fn test_extract_is_case_sensitive_and_drops_self() {
        let refs = extract_references("r/Rust r/rust /r/Self", "Self");
        assert_eq!(refs, vec!["Rust", "rust"]);
    }

    #[test]
    fn test_expand_records_edges_and_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        let manager = PersistenceManager::new(&path, 10).unwrap();
        let ctx = context(&manager);
        ctx.persist
            .send_new("abc", CommunityRecord::discovered("X", false))
            .unwrap();

        let outcome = expand_community("X", &Descriptions, &ctx);
        assert!(matches!(outcome, ExpandOutcome::Expanded { references: 1, .. }));
        assert_eq!(ctx.store.weight("X", "Y"), 1);
        assert_eq!(ctx.store.weight("Y", "X"), 1);
        assert_eq!(ctx.store.weight("X", "X"), 0);

        manager.finish().unwrap();
        let record = load_document(&path).unwrap().find("X").cloned().unwrap();
        assert_eq!(record.related_names, vec!["Y".to_string()]);
        assert_eq!(record.related_count, 1);
    }

    #[test]
    fn test_stop_mid_item_keeps_graph_and_store_in_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        let manager = PersistenceManager::new(&path, 10).unwrap();
        let ctx = context(&manager);
        ctx.persist
            .send_new("abc", CommunityRecord::discovered("X", false))
            .unwrap();
        ctx.running.store(false, Ordering::SeqCst);

        let outcome = expand_community("X", &Descriptions, &ctx);
        assert!(matches!(outcome, ExpandOutcome::Expanded { references: 1, .. }));
        assert_eq!(ctx.store.weight("X", "Y"), 1);

        manager.finish().unwrap();
        let record = load_document(&path).unwrap().find("X").cloned().unwrap();
        assert_eq!(record.related_names, vec!["Y".to_string()]);
    }

    #[test]
    fn test_expand_skips() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);

        assert!(matches!(expand_community("Hidden", &Descriptions, &ctx), ExpandOutcome::Skipped { .. }));
        assert!(matches!(expand_community("Locked", &Descriptions, &ctx), ExpandOutcome::Skipped { .. }));
        assert!(matches!(expand_community("Broken", &Descriptions, &ctx), ExpandOutcome::Failed { .. }));
        assert!(matches!(
            expand_community("Quiet", &Descriptions, &ctx),
            ExpandOutcome::Expanded { references: 0, .. }
        ));
        assert_eq!(ctx.store.edge_count(), 0);

        manager.finish().unwrap();
        // Nothing was referenced, so no update cycle ran
        assert_eq!(ctx.persist.stats().writes_completed(), 0);
    }

    #[test]
    fn test_worker_exits_when_searchers_done() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, rx) = discovery_channel();

        tx.push("Broken".into()).unwrap();
        tx.push("Quiet".into()).unwrap();
        drop(tx);

        let worker = ExpansionWorker::spawn(
            rx,
            Arc::new(Descriptions),
            ctx,
            Duration::from_millis(20),
            ExpansionExit::SearchersDone,
        )
        .unwrap();
        let stats = Arc::clone(&worker.stats);
        worker.join().unwrap();

        assert_eq!(stats.expanded(), 1);
        assert_eq!(stats.errors(), 1);
        manager.finish().unwrap();
    }

    #[test]
    fn test_worker_exits_on_idle_timeout() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let ctx = context(&manager);
        let (tx, rx) = discovery_channel();

        let worker = ExpansionWorker::spawn(
            rx,
            Arc::new(Descriptions),
            ctx,
            Duration::from_millis(20),
            ExpansionExit::IdleTimeout,
        )
        .unwrap();
        worker.join().unwrap();

        // Sender still alive: only the idle timeout could have ended it
        drop(tx);
        manager.finish().unwrap();
    }
}
