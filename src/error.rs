//! Error types for community-crawler
//!
//! This module defines the error hierarchy used across the crawler:
//! - Remote collaborator errors (search and description fetch)
//! - Durable store errors
//! - Relay (Redis) errors
//! - Configuration and worker errors
//!
//! Only configuration errors are expected to reach the caller. Everything
//! else is logged by the worker that hit it and the item is skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Search/description collaborator errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Relay errors
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Errors returned by the remote search and description collaborators
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Authentication against the remote service failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Community does not exist
    #[error("Community not found: '{name}'")]
    NotFound { name: String },

    /// Community exists but is not publicly accessible
    #[error("Community is private: '{name}'")]
    Private { name: String },

    /// The service refused the request because of rate limiting
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Unexpected HTTP status
    #[error("HTTP {status} from '{url}'")]
    Status { status: u16, url: String },

    /// Transport failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Check if this error means the community should simply be skipped
    pub fn is_skip(&self) -> bool {
        matches!(self, ApiError::NotFound { .. } | ApiError::Private { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the store file failed
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing store content could not be decoded
    #[error("Malformed store '{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Store could not be encoded
    #[error("Failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing the temporary file into place failed
    #[error("Failed to replace '{path}': {reason}")]
    Persist { path: PathBuf, reason: String },

    /// Write queue closed unexpectedly
    #[error("Persistence queue closed unexpectedly")]
    ChannelClosed,
}

/// Relay (Redis) errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Could not connect to Redis
    #[error("Failed to connect to Redis at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Event could not be serialized
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::Redis(err.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Term space produced no terms
    #[error("No search terms available")]
    EmptyTermSpace,

    /// Invalid maximum term length
    #[error("Invalid search term length {length}: must be between 1 and {max}")]
    InvalidTermLength { length: usize, max: usize },

    /// Invalid per-term result limit
    #[error("Invalid search limit {limit}: must be between 1 and {max}")]
    InvalidSearchLimit { limit: usize, max: usize },

    /// Invalid backup frequency
    #[error("Invalid backup frequency {0}: must be at least 1")]
    InvalidBackupFrequency(u64),

    /// Store path error
    #[error("Invalid store path '{path}': {reason}")]
    InvalidStorePath { path: PathBuf, reason: String },

    /// Remote credentials missing
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker '{name}' panicked")]
    Panicked { name: String },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The discovery queue has no receiver left
    #[error("Discovery queue closed")]
    QueueClosed,
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for ApiError
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for RelayError
pub type RelayResult<T> = std::result::Result<T, RelayError>;

/// Outcome of expanding a single community
#[derive(Debug)]
pub enum ExpandOutcome {
    /// Description fetched and references recorded
    Expanded { name: String, references: usize },

    /// Community skipped (not public, not found)
    Skipped { name: String, reason: String },

    /// Fetch failed
    Failed { name: String, error: ApiError },
}
