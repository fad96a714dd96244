//! Redis-backed event relay
//!
//! Events are appended with RPUSH to a single list so a consumer can pop
//! them in discovery order. The list is deleted when the relay starts and
//! again when it closes; each crawl session starts from an empty queue.

use crate::error::{RelayError, RelayResult};
use crate::relay::{EventRelay, RelayEvent};
use parking_lot::Mutex;
use redis::{Client, Commands, Connection};
use std::time::Duration;
use tracing::{info, warn};

/// Redis key of the graph event list
pub const GRAPH_QUEUE_KEY: &str = "reddit_graph_queue";

/// Configuration for the Redis relay
#[derive(Debug, Clone)]
pub struct RedisRelayConfig {
    /// Redis connection URL
    pub url: String,
    /// List key events are pushed onto
    pub queue_name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for RedisRelayConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            queue_name: GRAPH_QUEUE_KEY.to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisRelayConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Relay publishing onto a Redis list
pub struct RedisRelay {
    connection: Mutex<Option<Connection>>,
    config: RedisRelayConfig,
}

impl RedisRelay {
    /// Connect, verify with PING and clear the queue
    pub fn connect(config: RedisRelayConfig) -> RelayResult<Self> {
        let connection_failed = |e: redis::RedisError| RelayError::ConnectionFailed {
            url: config.url.clone(),
            reason: e.to_string(),
        };

        let client = Client::open(config.url.as_str()).map_err(connection_failed)?;
        let mut conn = client
            .get_connection_with_timeout(config.connect_timeout)
            .map_err(connection_failed)?;

        redis::cmd("PING")
            .query::<String>(&mut conn)
            .map_err(connection_failed)?;

        info!(url = %config.url, queue = %config.queue_name, "Connected to Redis");

        let relay = Self {
            connection: Mutex::new(Some(conn)),
            config,
        };
        relay.reset()?;
        Ok(relay)
    }

    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> RelayResult<T> {
        let mut guard = self.connection.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| RelayError::Redis("connection closed".into()))?;
        Ok(op(conn)?)
    }
}

impl EventRelay for RedisRelay {
    fn publish(&self, event: &RelayEvent) -> RelayResult<()> {
        let payload = serde_json::to_string(event)?;
        self.with_connection(|conn| conn.rpush::<_, _, ()>(&self.config.queue_name, payload))
    }

    fn reset(&self) -> RelayResult<()> {
        self.with_connection(|conn| conn.del::<_, ()>(&self.config.queue_name))
    }

    fn close(&self) -> RelayResult<()> {
        let Some(mut conn) = self.connection.lock().take() else {
            return Ok(());
        };

        let result = conn.del::<_, ()>(&self.config.queue_name);
        drop(conn);

        match result {
            Ok(()) => {
                info!("Redis connection closed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear relay queue on close");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Publishing needs a running Redis instance; these cover configuration

    #[test]
    fn test_config_defaults() {
        let config = RedisRelayConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.queue_name, "reddit_graph_queue");
    }

    #[test]
    fn test_config_with_url() {
        let config = RedisRelayConfig::with_url("redis://custom:6380");
        assert_eq!(config.url, "redis://custom:6380");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_connect_invalid_url() {
        let err = RedisRelay::connect(RedisRelayConfig::with_url("not a url")).err().unwrap();
        assert!(matches!(err, RelayError::ConnectionFailed { .. }));
    }
}
