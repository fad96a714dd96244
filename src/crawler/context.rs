//! Handles shared by every crawl worker

use crate::crawler::state::{DiscoveryStore, StatusLine};
use crate::relay::EventRelay;
use crate::store::PersistHandle;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared state and output channels a worker needs
#[derive(Clone)]
pub struct WorkerContext {
    /// Mutex-guarded discovery state
    pub store: Arc<DiscoveryStore>,

    /// Persistence queue
    pub persist: PersistHandle,

    /// Optional relay
    pub relay: Option<Arc<dyn EventRelay>>,

    /// Cleared to stop all workers at their next loop boundary
    pub running: Arc<AtomicBool>,

    /// Current activity line
    pub status: Arc<StatusLine>,
}

impl WorkerContext {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn relay(&self) -> Option<&dyn EventRelay> {
        self.relay.as_deref()
    }
}
