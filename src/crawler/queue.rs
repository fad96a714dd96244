//! Discovery queue linking search workers to the expansion worker
//!
//! Search workers push every newly claimed community name; the expansion
//! worker pops them. The queue is unbounded: names are small and the
//! processed set already caps it at one entry per community.
//!
//! Completion is signalled by disconnection. Once every
//! [`DiscoverySender`] is dropped (both search workers finished) and the
//! queue is drained, [`DiscoveryReceiver::pop`] returns [`Pop::Closed`].

use crate::error::WorkerError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Statistics for the discovery queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total names enqueued
    pub enqueued: AtomicU64,

    /// Total names dequeued
    pub dequeued: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }
}

/// Result of a timed pop
#[derive(Debug, PartialEq, Eq)]
pub enum Pop {
    /// A community name to expand
    Item(String),

    /// Nothing arrived within the timeout
    Idle,

    /// All senders are gone and the queue is empty
    Closed,
}

/// Create a connected sender/receiver pair
pub fn discovery_channel() -> (DiscoverySender, DiscoveryReceiver) {
    let (sender, receiver) = unbounded();
    let stats = Arc::new(QueueStats::default());

    (
        DiscoverySender {
            sender,
            stats: Arc::clone(&stats),
        },
        DiscoveryReceiver { receiver, stats },
    )
}

/// Handle for pushing names (one clone per search worker)
#[derive(Clone)]
pub struct DiscoverySender {
    sender: Sender<String>,
    stats: Arc<QueueStats>,
}

impl DiscoverySender {
    /// Push a name; fails only if every receiver is gone
    pub fn push(&self, name: String) -> Result<(), WorkerError> {
        self.sender.send(name).map_err(|_| WorkerError::QueueClosed)?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Handle for popping names
#[derive(Clone)]
pub struct DiscoveryReceiver {
    receiver: Receiver<String>,
    stats: Arc<QueueStats>,
}

impl DiscoveryReceiver {
    /// Wait up to `timeout` for the next name
    pub fn pop(&self, timeout: Duration) -> Pop {
        match self.receiver.recv_timeout(timeout) {
            Ok(name) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                Pop::Item(name)
            }
            Err(RecvTimeoutError::Timeout) => Pop::Idle,
            Err(RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    /// Discard everything still queued, returning how many names were dropped
    pub fn drain(&self) -> usize {
        self.receiver.try_iter().count()
    }

    /// Get queue statistics
    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Get current queue length
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop() {
        let (tx, rx) = discovery_channel();
        tx.push("rust".into()).unwrap();
        assert_eq!(rx.len(), 1);

        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Item("rust".into()));
        assert!(rx.is_empty());

        let stats = rx.stats();
        assert_eq!(stats.enqueued(), 1);
        assert_eq!(stats.dequeued(), 1);
    }

    #[test]
    fn test_idle_then_closed() {
        let (tx, rx) = discovery_channel();
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Idle);

        tx.push("last".into()).unwrap();
        drop(tx);

        // Queued items are still delivered after disconnection
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Item("last".into()));
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Closed);
    }

    #[test]
    fn test_closed_waits_for_all_senders() {
        let (tx, rx) = discovery_channel();
        let tx2 = tx.clone();
        drop(tx);
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Idle);
        drop(tx2);
        assert_eq!(rx.pop(Duration::from_millis(10)), Pop::Closed);
    }

    #[test]
    fn test_push_without_receiver() {
        let (tx, rx) = discovery_channel();
        drop(rx);
        assert!(matches!(tx.push("orphan".into()), Err(WorkerError::QueueClosed)));
    }

    #[test]
    fn test_drain() {
        let (tx, rx) = discovery_channel();
        for i in 0..5 {
            tx.push(format!("c{}", i)).unwrap();
        }
        assert_eq!(rx.drain(), 5);
        assert!(rx.is_empty());
    }
}
