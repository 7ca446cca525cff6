use crate::{StateError, StateStore};
use chrono::Utc;
use faultline_common::metrics::{MetricKind, MetricSnapshot};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One persisted snapshot of the latest-value map.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub timestamp: i64,
    pub entries: Vec<MetricSnapshot>,
}

/// SQLite-backed snapshot store. Snapshots are keyed by timestamp and
/// pruned beyond the retention window; a save or load failure is never
/// fatal to the pipeline.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    pub fn open(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                timestamp INTEGER PRIMARY KEY,
                payload   TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist the current latest-value map.
    pub fn save(&self, store: &StateStore) -> Result<(), StateError> {
        let mut entries = Vec::new();
        for kind in [
            MetricKind::Node,
            MetricKind::Container,
            MetricKind::Service,
            MetricKind::Business,
        ] {
            entries.extend(store.all_latest(kind));
        }

        let payload = SnapshotPayload {
            timestamp: Utc::now().timestamp(),
            entries,
        };
        let json = serde_json::to_string(&payload)?;

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("INSERT OR REPLACE INTO snapshots (timestamp, payload) VALUES (?1, ?2)")?;
        stmt.execute(rusqlite::params![payload.timestamp, json])?;
        Ok(())
    }

    /// Most recent persisted snapshot.
    pub fn load_latest(&self) -> Result<SnapshotPayload, StateError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare_cached("SELECT payload FROM snapshots ORDER BY timestamp DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(serde_json::from_str(&json)?)
            }
            None => Err(StateError::NoSnapshot),
        }
    }

    /// Restore the latest-value map from the most recent snapshot.
    /// Returns the number of restored entries.
    pub fn restore(&self, store: &StateStore) -> Result<usize, StateError> {
        let payload = self.load_latest()?;
        let count = payload.entries.len();
        store.restore_latest(payload.entries);
        Ok(count)
    }

    /// Delete snapshots older than the retention window. Returns the number
    /// of removed rows.
    pub fn prune(&self, retention: chrono::Duration) -> Result<usize, StateError> {
        let cutoff = Utc::now().timestamp() - retention.num_seconds();
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM snapshots WHERE timestamp < ?1",
            rusqlite::params![cutoff],
        )?;
        Ok(removed)
    }
}

/// Background persistence loop: save + prune on every tick until cancelled,
/// with one final save on shutdown. Failures are logged and skipped.
pub fn spawn_snapshot_task(
    store: Arc<StateStore>,
    snapshots: Arc<SnapshotStore>,
    interval: Duration,
    retention: chrono::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = snapshots.save(&store) {
                        tracing::warn!(error = %e, "Final snapshot save failed");
                    }
                    return;
                }
                _ = tick.tick() => {
                    if let Err(e) = snapshots.save(&store) {
                        tracing::warn!(error = %e, "Snapshot save failed");
                    }
                    match snapshots.prune(retention) {
                        Ok(removed) if removed > 0 => {
                            tracing::debug!(removed, "Pruned expired snapshots");
                        }
                        Err(e) => tracing::warn!(error = %e, "Snapshot prune failed"),
                        _ => {}
                    }
                }
            }
        }
    })
}
