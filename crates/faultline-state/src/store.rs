use chrono::Utc;
use faultline_common::metrics::{MetricKind, MetricSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

/// Ring capacity per target. At one sample every second this covers the
/// ten-minute retention window.
pub const DEFAULT_RING_CAPACITY: usize = 600;

type TargetKey = (MetricKind, String);

/// Fixed-capacity append-only ring. Entries keep arrival order; the time
/// window is applied at query time.
struct RingBuffer {
    capacity: usize,
    entries: VecDeque<MetricSnapshot>,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, snapshot: MetricSnapshot) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    fn since(&self, cutoff: i64) -> Vec<MetricSnapshot> {
        self.entries
            .iter()
            .filter(|s| s.timestamp() >= cutoff)
            .cloned()
            .collect()
    }
}

/// Store statistics for dashboards and logs.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub latest_states: usize,
    pub history_buffers: usize,
    pub active_alerts: usize,
    pub ring_capacity: usize,
}

/// Central metric/alert state.
///
/// `check_and_update_alert` is the single source of firing/resolved edge
/// detection: it atomically compares the stored active flag against the new
/// evaluation and reports whether an edge occurred. Callers must invoke it
/// exactly once per threshold evaluation.
pub struct StateStore {
    ring_capacity: usize,
    latest: RwLock<HashMap<TargetKey, MetricSnapshot>>,
    history: RwLock<HashMap<TargetKey, RingBuffer>>,
    alerts: Mutex<HashMap<String, bool>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_ring_capacity(DEFAULT_RING_CAPACITY)
    }

    pub fn with_ring_capacity(ring_capacity: usize) -> Self {
        Self {
            ring_capacity: ring_capacity.max(1),
            latest: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Record a snapshot: update the latest-value map and append to the
    /// target's ring buffer. Out-of-order timestamps are stored as they
    /// arrive.
    pub fn update(&self, snapshot: MetricSnapshot) {
        let key = (snapshot.kind(), snapshot.id().to_string());

        {
            let mut history = self.history.write().unwrap();
            let ring = history
                .entry(key.clone())
                .or_insert_with(|| RingBuffer::new(self.ring_capacity));
            ring.push(snapshot.clone());
        }

        let mut latest = self.latest.write().unwrap();
        latest.insert(key, snapshot);
    }

    /// Restore the latest-value map from a persisted snapshot without
    /// touching the history rings.
    pub fn restore_latest(&self, snapshots: Vec<MetricSnapshot>) {
        let mut latest = self.latest.write().unwrap();
        for snapshot in snapshots {
            latest.insert((snapshot.kind(), snapshot.id().to_string()), snapshot);
        }
    }

    pub fn latest(&self, kind: MetricKind, id: &str) -> Option<MetricSnapshot> {
        let latest = self.latest.read().unwrap();
        latest.get(&(kind, id.to_string())).cloned()
    }

    pub fn all_latest(&self, kind: MetricKind) -> Vec<MetricSnapshot> {
        let latest = self.latest.read().unwrap();
        latest
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// History entries within `window` of now, in insertion order.
    pub fn history(&self, kind: MetricKind, id: &str, window: chrono::Duration) -> Vec<MetricSnapshot> {
        self.history_since(kind, id, Utc::now().timestamp() - window.num_seconds())
    }

    /// History entries with `timestamp >= cutoff`, in insertion order.
    pub fn history_since(&self, kind: MetricKind, id: &str, cutoff: i64) -> Vec<MetricSnapshot> {
        let history = self.history.read().unwrap();
        match history.get(&(kind, id.to_string())) {
            Some(ring) => ring.since(cutoff),
            None => Vec::new(),
        }
    }

    fn alert_key(alert_id: &str, source: &str) -> String {
        if source.is_empty() {
            alert_id.to_string()
        } else {
            format!("{alert_id}:{source}")
        }
    }

    /// Compare-and-update of the active flag for (`alert_id`, `source`).
    ///
    /// Returns `(edge_changed, is_firing)`. The first call for an unseen key
    /// is always an edge, so a rule that starts out firing emits immediately.
    pub fn check_and_update_alert(
        &self,
        alert_id: &str,
        source: &str,
        is_firing: bool,
    ) -> (bool, bool) {
        let key = Self::alert_key(alert_id, source);
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.get(&key) {
            Some(&was_active) if was_active == is_firing => (false, is_firing),
            _ => {
                alerts.insert(key, is_firing);
                (true, is_firing)
            }
        }
    }

    pub fn alert_active(&self, alert_id: &str, source: &str) -> bool {
        let alerts = self.alerts.lock().unwrap();
        alerts
            .get(&Self::alert_key(alert_id, source))
            .copied()
            .unwrap_or(false)
    }

    /// Keys of all currently-firing alerts.
    pub fn active_alerts(&self) -> Vec<String> {
        let alerts = self.alerts.lock().unwrap();
        alerts
            .iter()
            .filter(|(_, &active)| active)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn active_alert_count(&self) -> usize {
        let alerts = self.alerts.lock().unwrap();
        alerts.values().filter(|&&active| active).count()
    }

    /// Forget an alert entirely, including every source-scoped key, so the
    /// next evaluation starts from the unseen state again.
    pub fn reset_alert(&self, alert_id: &str) {
        let prefix = format!("{alert_id}:");
        let mut alerts = self.alerts.lock().unwrap();
        alerts.retain(|key, _| key != alert_id && !key.starts_with(&prefix));
    }

    pub fn reset_all_alerts(&self) {
        let mut alerts = self.alerts.lock().unwrap();
        alerts.clear();
    }

    pub fn stats(&self) -> StoreStats {
        let latest_states = self.latest.read().unwrap().len();
        let history_buffers = self.history.read().unwrap().len();
        StoreStats {
            latest_states,
            history_buffers,
            active_alerts: self.active_alert_count(),
            ring_capacity: self.ring_capacity,
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
