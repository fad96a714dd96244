//! Durable JSON store for the discovered community graph
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │  Search Workers (2)  │   │   Expansion Worker   │
//! │   Mutation::New      │   │   Mutation::Update   │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            │                          │
//!            └────────────┬─────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │   PersistenceManager     │
//!            │  - one thread owns file  │
//!            │  - load/mutate/overwrite │
//!            │  - backup every N writes │
//!            └────────────┬─────────────┘
//!                         ▼
//!            ┌──────────────────────────┐
//!            │  store.json              │
//!            │  store.json.backup       │
//!            └──────────────────────────┘
//! ```

pub mod schema;
pub mod writer;

pub use schema::{
    backup_path, load_document, write_document, CommunityRecord, CommunityUpdate, StoreDocument,
    StoreMetadata, TermBucket,
};
pub use writer::{
    Mutation, PersistHandle, PersistMessage, PersistState, PersistStats, PersistenceManager,
    DEFAULT_BACKUP_FREQUENCY,
};
