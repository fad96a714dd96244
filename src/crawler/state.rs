//! Shared discovery state
//!
//! Everything the workers mutate concurrently lives in one
//! [`DiscoveryStore`] behind one mutex:
//! - the processed set (names already dispatched for expansion)
//! - the weighted, symmetric adjacency map
//! - per-name reference counters
//! - per-thread last-processed markers
//!
//! Each public method is one critical section. No I/O happens while the
//! lock is held.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Last term a search thread finished, or the term that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastProcessed {
    Term(String),
    Errored(String),
}

impl fmt::Display for LastProcessed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastProcessed::Term(term) => write!(f, "{}", term),
            LastProcessed::Errored(term) => write!(f, "ERROR: {}", term),
        }
    }
}

#[derive(Debug, Default)]
struct DiscoveryState {
    processed: HashSet<String>,
    adjacency: HashMap<String, HashMap<String, u64>>,
    results: HashMap<String, u64>,
    last_processed: HashMap<String, LastProcessed>,
}

/// In-memory discovery state shared by all workers
#[derive(Debug, Default)]
pub struct DiscoveryStore {
    inner: Mutex<DiscoveryState>,
}

impl DiscoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for expansion
    ///
    /// Returns true exactly once per name; every later call (from any
    /// thread) returns false.
    pub fn claim(&self, name: &str) -> bool {
        let mut state = self.inner.lock();
        if state.processed.contains(name) {
            return false;
        }
        state.processed.insert(name.to_string());
        true
    }

    /// Check whether `name` has been claimed
    pub fn is_processed(&self, name: &str) -> bool {
        self.inner.lock().processed.contains(name)
    }

    /// Number of claimed names
    pub fn processed_count(&self) -> usize {
        self.inner.lock().processed.len()
    }

    /// Record every reference `source` makes, in one critical section
    pub fn record_references(&self, source: &str, references: &[String]) {
        let mut state = self.inner.lock();
        for reference in references.iter().filter(|r| r.as_str() != source) {
            *state
                .adjacency
                .entry(source.to_string())
                .or_default()
                .entry(reference.clone())
                .or_insert(0) += 1;
            *state
                .adjacency
                .entry(reference.clone())
                .or_default()
                .entry(source.to_string())
                .or_insert(0) += 1;
            *state.results.entry(reference.clone()).or_insert(0) += 1;
        }
    }

    /// Edge weight from `a` to `b` (0 if absent)
    pub fn weight(&self, a: &str, b: &str) -> u64 {
        self.inner
            .lock()
            .adjacency
            .get(a)
            .and_then(|neighbors| neighbors.get(b))
            .copied()
            .unwrap_or(0)
    }

    /// Neighbors of `name`, heaviest first
    pub fn neighbors(&self, name: &str) -> Vec<(String, u64)> {
        let mut neighbors: Vec<(String, u64)> = self
            .inner
            .lock()
            .adjacency
            .get(name)
            .map(|n| n.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        neighbors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        neighbors
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        let state = self.inner.lock();
        let directed: usize = state.adjacency.values().map(HashMap::len).sum();
        directed / 2
    }

    /// How many times `name` was referenced by an expanded community
    pub fn result_count(&self, name: &str) -> u64 {
        self.inner.lock().results.get(name).copied().unwrap_or(0)
    }

    /// Copy of the adjacency map
    pub fn adjacency_snapshot(&self) -> HashMap<String, HashMap<String, u64>> {
        self.inner.lock().adjacency.clone()
    }

    /// Mark `term` as the last term `thread` completed
    pub fn mark_processed(&self, thread: &str, term: &str) {
        self.inner
            .lock()
            .last_processed
            .insert(thread.to_string(), LastProcessed::Term(term.to_string()));
    }

    /// Mark `term` as failed for `thread`
    pub fn mark_errored(&self, thread: &str, term: &str) {
        self.inner
            .lock()
            .last_processed
            .insert(thread.to_string(), LastProcessed::Errored(term.to_string()));
    }

    /// Last-processed marker of `thread`
    pub fn last_processed(&self, thread: &str) -> Option<LastProcessed> {
        self.inner.lock().last_processed.get(thread).cloned()
    }

    /// Drop all in-memory state (session teardown)
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.processed.clear();
        state.adjacency.clear();
        state.results.clear();
        state.last_processed.clear();
    }
}

/// Current human-readable activity, shown by the progress display
#[derive(Debug)]
pub struct StatusLine {
    line: Mutex<String>,
}

impl StatusLine {
    pub fn new(initial: &str) -> Self {
        Self {
            line: Mutex::new(initial.to_string()),
        }
    }

    pub fn set(&self, status: String) {
        *self.line.lock() = status;
    }

    pub fn get(&self) -> String {
        self.line.lock().clone()
    }
}
