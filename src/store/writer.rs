//! Background persistence manager
//!
//! A single dedicated thread owns the store file. Producers send
//! [`PersistMessage`]s through a [`PersistHandle`]; the thread applies each
//! one as a full load, mutate, overwrite cycle.
//!
//! # Cycle
//!
//! 1. Load the store (missing file = empty store)
//! 2. Apply the mutation (append for new, locate-and-patch for update)
//! 3. Stamp `metadata.last_update` and overwrite the file
//! 4. Every `backup_frequency` successful writes, also write `<path>.backup`
//!
//! A failed cycle is logged and dropped. The file is only written after a
//! successful load and mutate, so a bad cycle never truncates good data.

use crate::error::{StoreError, StoreResult};
use crate::store::schema::{self, CommunityRecord, CommunityUpdate};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Default number of successful writes between backups
pub const DEFAULT_BACKUP_FREQUENCY: u64 = 10;

/// Receive timeout of the writer loop
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// A change to apply to the store document
#[derive(Debug)]
pub enum Mutation {
    /// Append a newly discovered community under its search term
    New {
        search_term: String,
        record: CommunityRecord,
    },

    /// Patch an existing community with expansion results
    Update(CommunityUpdate),
}

/// Message types sent to the writer thread
#[derive(Debug)]
pub enum PersistMessage {
    /// Run one load, mutate, overwrite cycle
    Apply(Mutation),

    /// Stop after everything queued ahead of this message is applied
    Shutdown,
}

/// Writer thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PersistState {
    Idle = 0,
    Applying = 1,
    ShuttingDown = 2,
}

impl PersistState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PersistState::Applying,
            2 => PersistState::ShuttingDown,
            _ => PersistState::Idle,
        }
    }
}

/// Statistics about write cycles
#[derive(Debug, Default)]
pub struct PersistStats {
    /// Successful primary writes
    pub writes_completed: AtomicU64,

    /// Backup copies written
    pub backups_written: AtomicU64,

    /// Abandoned cycles
    pub failed_cycles: AtomicU64,

    /// Records appended
    pub records_added: AtomicU64,

    /// Records patched
    pub records_updated: AtomicU64,

    /// Updates that matched no stored record
    pub updates_unmatched: AtomicU64,
}

impl PersistStats {
    pub fn writes_completed(&self) -> u64 {
        self.writes_completed.load(Ordering::Relaxed)
    }

    pub fn backups_written(&self) -> u64 {
        self.backups_written.load(Ordering::Relaxed)
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::Relaxed)
    }
}

/// Handle for sending messages to the writer
#[derive(Clone)]
pub struct PersistHandle {
    sender: Sender<PersistMessage>,
    stats: Arc<PersistStats>,
    state: Arc<AtomicU8>,
}

impl PersistHandle {
    /// Queue a newly discovered community
    pub fn send_new(&self, search_term: &str, record: CommunityRecord) -> StoreResult<()> {
        self.sender
            .send(PersistMessage::Apply(Mutation::New {
                search_term: search_term.to_string(),
                record,
            }))
            .map_err(|_| StoreError::ChannelClosed)
    }

    /// Queue an expansion update
    pub fn send_update(&self, update: CommunityUpdate) -> StoreResult<()> {
        self.sender
            .send(PersistMessage::Apply(Mutation::Update(update)))
            .map_err(|_| StoreError::ChannelClosed)
    }

    /// Request shutdown (pending writes are applied first)
    pub fn shutdown(&self) -> StoreResult<()> {
        self.state
            .store(PersistState::ShuttingDown as u8, Ordering::SeqCst);
        self.sender
            .send(PersistMessage::Shutdown)
            .map_err(|_| StoreError::ChannelClosed)
    }

    /// Messages waiting to be applied
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Get writer statistics
    pub fn stats(&self) -> &PersistStats {
        &self.stats
    }

    /// Current writer state
    pub fn state(&self) -> PersistState {
        PersistState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Persistence manager that owns the store file in its own thread
pub struct PersistenceManager {
    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Handle for sending messages
    writer_handle: PersistHandle,

    /// Store file path
    store_path: PathBuf,
}

impl PersistenceManager {
    /// Spawn the writer thread for `store_path`
    pub fn new(store_path: &Path, backup_frequency: u64) -> StoreResult<Self> {
        let (sender, receiver) = unbounded();
        let stats = Arc::new(PersistStats::default());
        let state = Arc::new(AtomicU8::new(PersistState::Idle as u8));

        let writer_handle = PersistHandle {
            sender,
            stats: Arc::clone(&stats),
            state: Arc::clone(&state),
        };

        let path = store_path.to_path_buf();
        let backup_frequency = backup_frequency.max(1);

        let handle = thread::Builder::new()
            .name("store-writer".into())
            .spawn(move || writer_loop(path, receiver, stats, state, backup_frequency))
            .map_err(|e| StoreError::Io {
                path: store_path.to_path_buf(),
                source: e,
            })?;

        info!(path = %store_path.display(), backup_frequency, "Persistence manager started");

        Ok(Self {
            handle: Some(handle),
            writer_handle,
            store_path: store_path.to_path_buf(),
        })
    }

    /// Get a handle for sending messages to the writer
    pub fn handle(&self) -> PersistHandle {
        self.writer_handle.clone()
    }

    /// Drain the queue, stop the thread and wait for it
    pub fn finish(mut self) -> StoreResult<()> {
        let _ = self.writer_handle.shutdown();

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Store writer thread panicked");
                return Err(StoreError::ChannelClosed);
            }
        }

        info!(
            path = %self.store_path.display(),
            writes = self.writer_handle.stats.writes_completed(),
            backups = self.writer_handle.stats.backups_written(),
            failed = self.writer_handle.stats.failed_cycles(),
            "Persistence manager stopped"
        );
        Ok(())
    }
}

/// Internal writer thread function
fn writer_loop(
    path: PathBuf,
    receiver: Receiver<PersistMessage>,
    stats: Arc<PersistStats>,
    state: Arc<AtomicU8>,
    backup_frequency: u64,
) {
    let backup = schema::backup_path(&path);
    let mut since_backup = 0u64;

    loop {
        let mutation = match receiver.recv_timeout(POP_TIMEOUT) {
            Ok(PersistMessage::Shutdown) => break,
            Ok(PersistMessage::Apply(mutation)) => mutation,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Keep ShuttingDown visible while draining
        let _ = state.compare_exchange(
            PersistState::Idle as u8,
            PersistState::Applying as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        match apply_cycle(&path, mutation, &stats) {
            Ok(document) => {
                stats.writes_completed.fetch_add(1, Ordering::Relaxed);
                since_backup += 1;

                if since_backup >= backup_frequency {
                    match schema::write_document(&backup, &document) {
                        Ok(()) => {
                            stats.backups_written.fetch_add(1, Ordering::Relaxed);
                            since_backup = 0;
                            debug!(path = %backup.display(), "Backup written");
                        }
                        Err(e) => error!(error = %e, "Failed to write backup"),
                    }
                }
            }
            Err(e) => {
                stats.failed_cycles.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Persistence cycle abandoned");
            }
        }

        let _ = state.compare_exchange(
            PersistState::Applying as u8,
            PersistState::Idle as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    state.store(PersistState::ShuttingDown as u8, Ordering::SeqCst);
}

/// One load, mutate, overwrite cycle; returns the document that was written
fn apply_cycle(
    path: &Path,
    mutation: Mutation,
    stats: &PersistStats,
) -> StoreResult<schema::StoreDocument> {
    let mut document = schema::load_document(path)?;

    match mutation {
        Mutation::New {
            search_term,
            record,
        } => {
            trace!(term = %search_term, name = %record.name, "Adding community");
            document.add_new(&search_term, record);
            stats.records_added.fetch_add(1, Ordering::Relaxed);
        }
        Mutation::Update(update) => {
            if document.apply_update(&update) {
                stats.records_updated.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.updates_unmatched.fetch_add(1, Ordering::Relaxed);
                warn!(name = %update.name, "Update matched no stored community");
            }
        }
    }

    document.touch();
    schema::write_document(path, &document)?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{load_document, StoreDocument};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_writer_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let manager = PersistenceManager::new(&path, DEFAULT_BACKUP_FREQUENCY).unwrap();
        let handle = manager.handle();

        handle.send_new("abc", CommunityRecord::discovered("X", false)).unwrap();
        handle.send_new("abd", CommunityRecord::discovered("Y", true)).unwrap();
        handle
            .send_update(CommunityUpdate::new("X", vec!["Y".into()], false))
            .unwrap();

        manager.finish().unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.record_count(), 2);
        let x = doc.find("X").unwrap();
        assert_eq!(x.related_names, vec!["Y".to_string()]);
        assert_eq!(x.related_count, 1);
        assert!(doc.metadata.last_update.is_some());
        assert_eq!(handle.stats().writes_completed(), 3);
        assert_eq!(handle.state(), PersistState::ShuttingDown);
    }

    #[test]
    fn test_backup_after_ten_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let backup = schema::backup_path(&path);

        let manager = PersistenceManager::new(&path, 10).unwrap();
        let handle = manager.handle();

        for i in 0..9 {
            handle
                .send_new("a", CommunityRecord::discovered(format!("c{}", i), false))
                .unwrap();
        }
        handle.send_new("a", CommunityRecord::discovered("c9", false)).unwrap();
        manager.finish().unwrap();

        assert_eq!(handle.stats().writes_completed(), 10);
        assert_eq!(handle.stats().backups_written(), 1);
        assert_eq!(fs::read(&backup).unwrap(), fs::read(&path).unwrap());
    }

    #[test]
    fn test_no_backup_before_frequency() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let manager = PersistenceManager::new(&path, 10).unwrap();
        let handle = manager.handle();
        for i in 0..9 {
            handle
                .send_new("a", CommunityRecord::discovered(format!("c{}", i), false))
                .unwrap();
        }
        manager.finish().unwrap();

        assert!(!schema::backup_path(&path).exists());
        assert_eq!(handle.stats().backups_written(), 0);
    }

    #[test]
    fn test_malformed_store_is_preserved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ truncated").unwrap();

        let manager = PersistenceManager::new(&path, 10).unwrap();
        let handle = manager.handle();
        handle.send_new("a", CommunityRecord::discovered("X", false)).unwrap();
        manager.finish().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{ truncated");
        assert_eq!(handle.stats().failed_cycles(), 1);
        assert_eq!(handle.stats().writes_completed(), 0);
    }

    #[test]
    fn test_deleted_store_restarts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut doc = StoreDocument::default();
        doc.add_new("old", CommunityRecord::discovered("Old", false));
        schema::write_document(&path, &doc).unwrap();
        fs::remove_file(&path).unwrap();

        let manager = PersistenceManager::new(&path, 10).unwrap();
        let handle = manager.handle();
        handle.send_new("new", CommunityRecord::discovered("Fresh", false)).unwrap();
        manager.finish().unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc.record_count(), 1);
        assert!(doc.find("Old").is_none());
        assert!(doc.find("Fresh").is_some());
    }

    #[test]
    fn test_apply_cycle_unmatched_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let stats = PersistStats::default();

        let doc = apply_cycle(
            &path,
            Mutation::Update(CommunityUpdate::new("ghost", vec!["X".into()], false)),
            &stats,
        )
        .unwrap();

        assert_eq!(doc.record_count(), 0);
        assert_eq!(stats.updates_unmatched.load(Ordering::Relaxed), 1);
        assert!(path.exists());
    }

    #[test]
    fn test_shutdown_drains_queue_without_a_cycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let manager = PersistenceManager::new(&path, 10).unwrap();
        let handle = manager.handle();
        for i in 0..5 {
            handle
                .send_new("a", CommunityRecord::discovered(format!("c{}", i), false))
                .unwrap();
        }
        manager.finish().unwrap();

        assert_eq!(handle.stats().writes_completed(), 5);
        assert_eq!(handle.stats().failed_cycles(), 0);
        assert_eq!(load_document(&path).unwrap().record_count(), 5);
    }

    #[test]
    fn test_send_after_finish_fails() {
        let dir = tempdir().unwrap();
        let manager = PersistenceManager::new(&dir.path().join("s.json"), 10).unwrap();
        let handle = manager.handle();
        manager.finish().unwrap();

        let err = handle
            .send_new("a", CommunityRecord::discovered("late", false))
            .unwrap_err();
        assert!(matches!(err, StoreError::ChannelClosed));
    }
}
