//! On-disk store document and the mutations applied to it
//!
//! The store is a single JSON document:
//!
//! ```json
//! {
//!   "root": {
//!     "abc": {
//!       "subreddits": [
//!         {
//!           "name": "X",
//!           "search_term_count": 1,
//!           "related_count": 1,
//!           "related_subreddits": ["Y"],
//!           "nsfw": false
//!         }
//!       ]
//!     }
//!   },
//!   "metadata": { "last_update": "2024-01-01 12:00:00" }
//! }
//! ```
//!
//! Term buckets keep the order in which they were first created.

use crate::error::{StoreError, StoreResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Format of `metadata.last_update`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One discovered community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRecord {
    /// Community name
    pub name: String,

    /// Number of search hits that produced this record
    #[serde(rename = "search_term_count", default = "default_occurrence")]
    pub occurrence_count: u64,

    /// Number of distinct referenced communities
    #[serde(default)]
    pub related_count: usize,

    /// Referenced community names
    #[serde(rename = "related_subreddits", default)]
    pub related_names: Vec<String>,

    /// Sensitive-content classification (sticky once true)
    #[serde(rename = "nsfw", default)]
    pub is_restricted: bool,
}

fn default_occurrence() -> u64 {
    1
}

impl CommunityRecord {
    /// Record for a community first seen by a search
    pub fn discovered(name: impl Into<String>, is_restricted: bool) -> Self {
        Self {
            name: name.into(),
            occurrence_count: 1,
            related_count: 0,
            related_names: Vec::new(),
            is_restricted,
        }
    }
}

/// Expansion result for a community that is already stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityUpdate {
    pub name: String,
    pub related_names: Vec<String>,
    pub related_count: usize,
    pub is_restricted: bool,
}

impl CommunityUpdate {
    pub fn new(name: impl Into<String>, related_names: Vec<String>, is_restricted: bool) -> Self {
        Self {
            name: name.into(),
            related_count: related_names.len(),
            related_names,
            is_restricted,
        }
    }
}

/// Communities discovered by one search term
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermBucket {
    #[serde(default)]
    pub subreddits: Vec<CommunityRecord>,
}

/// Store-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

/// The whole on-disk document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDocument {
    #[serde(default)]
    pub root: IndexMap<String, TermBucket>,

    #[serde(default)]
    pub metadata: StoreMetadata,
}

impl StoreDocument {
    /// Append a record under `search_term`, creating the bucket if needed
    ///
    /// Always appends. Deduplication is the producer's job.
    pub fn add_new(&mut self, search_term: &str, record: CommunityRecord) {
        self.root
            .entry(search_term.to_string())
            .or_default()
            .subreddits
            .push(record);
    }

    /// Patch the first record named `update.name`, scanning buckets in order
    ///
    /// Returns false when no record matches. The restricted flag is only ever
    /// raised, never cleared.
    pub fn apply_update(&mut self, update: &CommunityUpdate) -> bool {
        let Some(record) = self.find_mut(&update.name) else {
            return false;
        };

        record.related_names = update.related_names.clone();
        record.related_count = update.related_count;
        record.is_restricted = record.is_restricted || update.is_restricted;
        true
    }

    /// First record named `name` across all buckets
    pub fn find(&self, name: &str) -> Option<&CommunityRecord> {
        self.root
            .values()
            .flat_map(|bucket| bucket.subreddits.iter())
            .find(|record| record.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut CommunityRecord> {
        self.root
            .values_mut()
            .flat_map(|bucket| bucket.subreddits.iter_mut())
            .find(|record| record.name == name)
    }

    /// Total number of records across all buckets
    pub fn record_count(&self) -> usize {
        self.root.values().map(|b| b.subreddits.len()).sum()
    }

    /// Stamp `metadata.last_update` with the current local time
    pub fn touch(&mut self) {
        self.metadata.last_update = Some(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string());
    }
}

/// Sibling path receiving periodic backups: `<path>.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

/// Load the store, treating a missing file as an empty store
///
/// Any other read or decode failure is returned so the caller can abandon
/// the cycle without touching the file.
pub fn load_document(path: &Path) -> StoreResult<StoreDocument> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Overwrite `path` with the full document
///
/// The document is written to a temporary file in the same directory and
/// renamed into place, so a crash mid-write leaves the previous file intact.
pub fn write_document(path: &Path, document: &StoreDocument) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(document)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;

    tmp.persist(path).map_err(|e| StoreError::Persist {
        path: path.to_path_buf(),
        reason: e.error.to_string(),
    })?;

    Ok(())
}
