//! Optional event relay to an external visualization consumer
//!
//! Discovery and expansion events are serialized to JSON and pushed onto a
//! named Redis list. Publishing is best-effort: a failure is logged and the
//! emitting worker carries on.

mod redis_relay;

pub use redis_relay::{RedisRelay, RedisRelayConfig, GRAPH_QUEUE_KEY};

use crate::error::RelayResult;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Event payload pushed onto the relay queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayEvent {
    /// A community found by a search
    Discovered {
        node: String,
        weight: u64,
        nsfw: bool,
        search_term: String,
    },

    /// Cross-references found in a community's description
    Connections {
        node: String,
        connections: Vec<String>,
        nsfw: bool,
    },
}

impl RelayEvent {
    pub fn discovered(node: &str, nsfw: bool, search_term: &str) -> Self {
        RelayEvent::Discovered {
            node: node.to_string(),
            weight: 1,
            nsfw,
            search_term: search_term.to_string(),
        }
    }

    pub fn connections(node: &str, connections: Vec<String>, nsfw: bool) -> Self {
        RelayEvent::Connections {
            node: node.to_string(),
            connections,
            nsfw,
        }
    }

    /// Node this event is about
    pub fn node(&self) -> &str {
        match self {
            RelayEvent::Discovered { node, .. } => node,
            RelayEvent::Connections { node, .. } => node,
        }
    }
}

/// Trait for relay implementations
pub trait EventRelay: Send + Sync {
    /// Push one event onto the queue
    fn publish(&self, event: &RelayEvent) -> RelayResult<()>;

    /// Drop everything currently queued
    fn reset(&self) -> RelayResult<()>;

    /// Drop queued events and release the connection
    fn close(&self) -> RelayResult<()>;
}

/// Publish if a relay is configured, logging instead of failing
pub fn publish_best_effort(relay: Option<&dyn EventRelay>, event: &RelayEvent) {
    if let Some(relay) = relay {
        if let Err(e) = relay.publish(event) {
            error!(node = %event.node(), error = %e, "Relay publish failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_payload() {
        let event = RelayEvent::discovered("rust", false, "ru");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"node": "rust", "weight": 1, "nsfw": false, "search_term": "ru"})
        );
    }

    #[test]
    fn test_connections_payload() {
        let event = RelayEvent::connections("rust", vec!["learnrust".into()], true);
        let json = serde_json::to_string(&event).unwrap();
        let back: RelayEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.node(), "rust");
    }
}
