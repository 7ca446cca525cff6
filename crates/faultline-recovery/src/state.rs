use crate::RecoveryError;
use faultline_common::types::{RecoveryResult, RecoveryStatus, TargetState};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Minimal contract between the recovery engine and whatever tracks target
/// state. A production deployment can back this with the platform's own
/// state service; the in-memory implementation below is enough for single
/// instance operation and tests.
pub trait RecoveryStateManager: Send + Sync {
    /// Atomically take the per-target single-flight lock. Success moves the
    /// target to `RECOVERING`; `Ok(false)` means someone else holds it.
    fn lock_recovering(&self, target_id: &str) -> Result<bool, RecoveryError>;

    /// Set the target's state. Any state other than `RECOVERING` releases
    /// the lock as a side effect.
    fn update_state(&self, target_id: &str, state: TargetState) -> Result<(), RecoveryError>;

    /// Record a terminal outcome and apply the matching state transition:
    /// `SUCCESS → HEALTHY`, `FAILED`/`TIMEOUT → FAILED`, everything else
    /// leaves the state untouched.
    fn report_result(&self, result: &RecoveryResult) -> Result<(), RecoveryError>;
}

#[derive(Default)]
struct StateInner {
    states: HashMap<String, TargetState>,
    recovering: HashSet<String>,
    last_results: HashMap<String, RecoveryResult>,
}

#[derive(Default)]
pub struct InMemoryStateManager {
    inner: Mutex<StateInner>,
}

impl InMemoryStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_state(&self, target_id: &str) -> Option<TargetState> {
        let inner = self.inner.lock().unwrap();
        inner.states.get(target_id).copied()
    }

    pub fn is_recovering(&self, target_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.recovering.contains(target_id)
    }

    pub fn last_result(&self, target_id: &str) -> Option<RecoveryResult> {
        let inner = self.inner.lock().unwrap();
        inner.last_results.get(target_id).cloned()
    }
}

impl RecoveryStateManager for InMemoryStateManager {
    fn lock_recovering(&self, target_id: &str) -> Result<bool, RecoveryError> {
        if target_id.is_empty() {
            return Err(RecoveryError::EmptyTarget);
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.recovering.contains(target_id) {
            return Ok(false);
        }
        inner.recovering.insert(target_id.to_string());
        inner
            .states
            .insert(target_id.to_string(), TargetState::Recovering);
        Ok(true)
    }

    fn update_state(&self, target_id: &str, state: TargetState) -> Result<(), RecoveryError> {
        if target_id.is_empty() {
            return Err(RecoveryError::EmptyTarget);
        }
        let mut inner = self.inner.lock().unwrap();
        inner.states.insert(target_id.to_string(), state);
        if state != TargetState::Recovering {
            inner.recovering.remove(target_id);
        }
        Ok(())
    }

    fn report_result(&self, result: &RecoveryResult) -> Result<(), RecoveryError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .last_results
                .insert(result.target_id.clone(), result.clone());
        }

        tracing::info!(
            target_id = %result.target_id,
            fault_code = %result.fault_code,
            action = %result.action,
            status = %result.status,
            message = %result.message,
            error = result.error.as_deref().unwrap_or(""),
            "Recovery result"
        );

        match result.status {
            RecoveryStatus::Success => self.update_state(&result.target_id, TargetState::Healthy),
            RecoveryStatus::Failed | RecoveryStatus::Timeout => {
                self.update_state(&result.target_id, TargetState::Failed)
            }
            RecoveryStatus::Rejected | RecoveryStatus::NoAction => Ok(()),
        }
    }
}
