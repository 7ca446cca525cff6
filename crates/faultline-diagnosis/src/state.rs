use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How often the background sweeper removes expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct StateEntry {
    state: bool,
    last_update: Instant,
    /// Zero means the entry never expires.
    ttl: Duration,
}

impl StateEntry {
    fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.last_update.elapsed() > self.ttl
    }
}

/// Per-event boolean state with optional TTL.
///
/// Expired entries read as `false`; the sweeper deletes them in the
/// background. Sweeping adjusts state only — diagnosis is never triggered
/// from the sweeper path.
pub struct StateMap {
    entries: Mutex<HashMap<String, StateEntry>>,
    default_ttl: Duration,
}

impl StateMap {
    /// State map whose entries never expire.
    pub fn permanent() -> Self {
        Self::with_ttl(Duration::ZERO)
    }

    /// State map whose entries expire `ttl` after their last update.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: ttl,
        }
    }

    pub fn set(&self, event_id: &str, state: bool) {
        self.set_with_ttl(event_id, state, self.default_ttl);
    }

    pub fn set_with_ttl(&self, event_id: &str, state: bool, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            event_id.to_string(),
            StateEntry {
                state,
                last_update: Instant::now(),
                ttl,
            },
        );
    }

    /// Current state; unknown and expired entries are `false`.
    pub fn get(&self, event_id: &str) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(event_id) {
            Some(entry) if !entry.is_expired() => entry.state,
            _ => false,
        }
    }

    pub fn reset(&self, event_id: &str) {
        self.set(event_id, false);
    }

    pub fn reset_all(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
    }

    /// Snapshot of all unexpired states.
    pub fn states(&self) -> HashMap<String, bool> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .map(|(id, e)| (id.clone(), e.state))
            .collect()
    }

    /// Ids of all events currently true.
    pub fn true_events(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .filter(|(_, e)| !e.is_expired() && e.state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        before - entries.len()
    }
}

/// Periodic expiry sweep until cancelled.
pub fn spawn_sweeper(
    states: Arc<StateMap>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {
                    let swept = states.sweep();
                    if swept > 0 {
                        tracing::debug!(swept, "Removed expired event states");
                    }
                }
            }
        }
    })
}
