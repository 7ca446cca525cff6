use crate::action::{Action, ActionContext};
use crate::state::RecoveryStateManager;
use crate::RecoveryError;
use chrono::Utc;
use faultline_common::types::{DiagnosisResult, RecoveryResult, RecoveryStatus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub queue_capacity: usize,
    pub action_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 200,
            action_timeout: Duration::from_secs(10),
        }
    }
}

/// Exact-match table plus ordered prefix list. Exact wins; otherwise the
/// first registered prefix that matches the fault code.
#[derive(Default, Clone)]
struct ActionRegistry {
    exact: std::collections::HashMap<String, Arc<dyn Action>>,
    prefix: Vec<(String, Arc<dyn Action>)>,
}

impl ActionRegistry {
    fn lookup(&self, fault_code: &str) -> Option<Arc<dyn Action>> {
        if let Some(action) = self.exact.get(fault_code) {
            return Some(action.clone());
        }
        self.prefix
            .iter()
            .find(|(prefix, _)| fault_code.starts_with(prefix.as_str()))
            .map(|(_, action)| action.clone())
    }
}

struct WorkerContext {
    state: Arc<dyn RecoveryStateManager>,
    registry: ActionRegistry,
    timeout: Duration,
}

/// Queue-backed recovery dispatcher.
///
/// `submit` never blocks; `start` launches one dispatcher task that spawns
/// a worker per event. Workers run concurrently across targets; the state
/// manager's lock single-flights them per target. Register all actions
/// before `start` — the registry is frozen from then on.
pub struct RecoveryEngine {
    state: Arc<dyn RecoveryStateManager>,
    config: RecoveryConfig,
    registry: ActionRegistry,
    tx: mpsc::Sender<DiagnosisResult>,
    rx: Mutex<Option<mpsc::Receiver<DiagnosisResult>>>,
}

impl RecoveryEngine {
    pub fn new(state: Arc<dyn RecoveryStateManager>, config: RecoveryConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            state,
            config,
            registry: ActionRegistry::default(),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn register_action(&mut self, fault_code: impl Into<String>, action: Arc<dyn Action>) {
        let fault_code = fault_code.into();
        if fault_code.is_empty() {
            return;
        }
        self.registry.exact.insert(fault_code, action);
    }

    /// Prefix routes are consulted in registration order.
    pub fn register_prefix_action(&mut self, prefix: impl Into<String>, action: Arc<dyn Action>) {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return;
        }
        self.registry.prefix.push((prefix, action));
    }

    /// Non-blocking enqueue. The only failure surface for callers is a full
    /// queue (or a stopped engine).
    pub fn submit(&self, event: DiagnosisResult) -> Result<(), RecoveryError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(RecoveryError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(RecoveryError::Closed),
        }
    }

    /// Launch the dispatcher loop. One worker task is spawned per dequeued
    /// event; the dispatcher itself only routes.
    pub fn start(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, RecoveryError> {
        let mut rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or(RecoveryError::AlreadyStarted)?;

        let worker_ctx = Arc::new(WorkerContext {
            state: self.state.clone(),
            registry: self.registry.clone(),
            timeout: self.config.action_timeout,
        });

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    maybe_event = rx.recv() => {
                        match maybe_event {
                            Some(event) => {
                                let ctx = worker_ctx.clone();
                                let deadline_token = cancel.child_token();
                                tokio::spawn(async move {
                                    handle_event(ctx, deadline_token, event).await;
                                });
                            }
                            None => return,
                        }
                    }
                }
            }
        }))
    }
}

fn now_unix() -> i64 {
    Utc::now().timestamp()
}

fn immediate_result(
    target_id: &str,
    event: &DiagnosisResult,
    action: &str,
    status: RecoveryStatus,
    message: &str,
) -> RecoveryResult {
    let now = now_unix();
    RecoveryResult {
        target_id: target_id.to_string(),
        fault_code: event.fault_code.clone(),
        action: action.to_string(),
        status,
        message: message.to_string(),
        error: None,
        started_at: now,
        finished_at: now,
    }
}

async fn handle_event(ctx: Arc<WorkerContext>, cancel: CancellationToken, event: DiagnosisResult) {
    let target_id = event.target_id().to_string();

    let Some(action) = ctx.registry.lookup(&event.fault_code) else {
        report(
            &ctx,
            immediate_result(
                &target_id,
                &event,
                "",
                RecoveryStatus::NoAction,
                "no action registered",
            ),
        );
        return;
    };

    if target_id.is_empty() {
        report(
            &ctx,
            immediate_result(
                "",
                &event,
                action.name(),
                RecoveryStatus::Failed,
                "empty target id",
            ),
        );
        return;
    }

    // The resolve path bypasses the single-flight lock: a resolution must
    // never be blocked by the in-flight execute it is undoing.
    if !event.is_resolved() {
        match ctx.state.lock_recovering(&target_id) {
            Ok(true) => {}
            Ok(false) => {
                report(
                    &ctx,
                    immediate_result(
                        &target_id,
                        &event,
                        action.name(),
                        RecoveryStatus::Rejected,
                        "target already recovering",
                    ),
                );
                return;
            }
            Err(e) => {
                let mut result = immediate_result(
                    &target_id,
                    &event,
                    action.name(),
                    RecoveryStatus::Failed,
                    "lock recovering failed",
                );
                result.error = Some(e.to_string());
                report(&ctx, result);
                return;
            }
        }
    }

    let started_at = now_unix();
    let action_ctx = ActionContext::new(cancel.clone());
    let outcome = tokio::time::timeout(ctx.timeout, run_action(&action, &action_ctx, &event)).await;

    let mut result = RecoveryResult {
        target_id,
        fault_code: event.fault_code.clone(),
        action: action.name().to_string(),
        status: RecoveryStatus::Success,
        message: String::new(),
        error: None,
        started_at,
        finished_at: now_unix(),
    };

    match outcome {
        Err(_elapsed) => {
            // Signal cooperative cancellation to whatever the action left
            // running.
            cancel.cancel();
            result.status = RecoveryStatus::Timeout;
            result.message = "action timeout".into();
            result.error = Some("deadline exceeded".into());
        }
        Ok(Err(e)) => {
            result.status = RecoveryStatus::Failed;
            result.message = "action failed".into();
            result.error = Some(format!("{e:#}"));
        }
        Ok(Ok(())) => {
            result.message = "action success".into();
        }
    }

    report(&ctx, result);
}

/// Firing events execute then verify; resolved events require a
/// [`crate::Resolver`] and run resolve then verify.
async fn run_action(
    action: &Arc<dyn Action>,
    ctx: &ActionContext,
    event: &DiagnosisResult,
) -> anyhow::Result<()> {
    if event.is_resolved() {
        let Some(resolver) = action.as_resolver() else {
            anyhow::bail!("action {} does not support resolve", action.name());
        };
        resolver.resolve(ctx, event).await?;
        return action.verify(ctx, event).await;
    }

    action.execute(ctx, event).await?;
    action.verify(ctx, event).await
}

fn report(ctx: &WorkerContext, result: RecoveryResult) {
    if let Err(e) = ctx.state.report_result(&result) {
        tracing::warn!(
            target_id = %result.target_id,
            status = %result.status,
            error = %e,
            "Failed to report recovery result"
        );
    }
}
