//! State store for the fault-management pipeline.
//!
//! Holds the latest metric snapshot and a bounded history ring per
//! (kind, id) target, plus the alert-state map that turns repeated
//! threshold evaluations into edge-triggered firing/resolved decisions.
//! An optional SQLite-backed snapshot store persists the latest-value map.

pub mod snapshot;
pub mod store;


pub use snapshot::{spawn_snapshot_task, SnapshotPayload, SnapshotStore};
pub use store::{StateStore, StoreStats, DEFAULT_RING_CAPACITY};

/// Errors from the state layer. Only the snapshot path can fail; the
/// in-memory store is infallible.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("State: sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("State: snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State: no snapshot available")]
    NoSnapshot,
}
