use crate::config::FaultTreeConfig;
use crate::state::{spawn_sweeper, StateMap, SWEEP_INTERVAL};
use crate::tree::{BuiltTree, EventArena, NodeId};
use crate::TreeError;
use faultline_common::types::{AlertEvent, DiagnosisResult, EVENT_STATUS_RESOLVED};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type DiagnosisCallback = Arc<dyn Fn(&DiagnosisResult) + Send + Sync>;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct DiagnosisConfig {
    /// TTL for event states. `None` keeps states until explicitly changed;
    /// `Some` enables expiry plus the background sweeper.
    pub state_ttl: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            state_ttl: None,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// Context captured when a top event fires, retained until it resolves so
/// the resolution emission carries the same source, service identity and
/// trigger path as the firing one.
#[derive(Debug, Default, Clone)]
struct TriggerContext {
    source: String,
    service_id: String,
    service_name: String,
    trigger_path: Vec<String>,
    basic_events: Vec<String>,
}

struct EngineInner {
    arena: EventArena,
    top_events: Vec<NodeId>,
    alert_bindings: HashMap<String, NodeId>,
    contexts: HashMap<String, TriggerContext>,
}

/// Fault-tree diagnosis engine.
///
/// `process_alert` runs under a single engine lock: update the bound basic
/// event, re-evaluate every top event in declaration order, and emit a
/// diagnosis on each state transition. Tree sizes are small, so the coarse
/// lock is the correctness boundary, not a bottleneck.
pub struct DiagnosisEngine {
    tree_id: String,
    inner: Mutex<EngineInner>,
    states: Arc<StateMap>,
    sweep_interval: Duration,
    ttl_enabled: bool,
    callback: RwLock<Option<DiagnosisCallback>>,
}

impl DiagnosisEngine {
    pub fn new(config: FaultTreeConfig) -> Result<Self, TreeError> {
        Self::with_config(config, DiagnosisConfig::default())
    }

    pub fn with_config(
        config: FaultTreeConfig,
        engine_config: DiagnosisConfig,
    ) -> Result<Self, TreeError> {
        config.validate()?;
        let BuiltTree {
            arena,
            top_events,
            alert_bindings,
        } = EventArena::build(&config)?;

        let states = match engine_config.state_ttl {
            Some(ttl) => StateMap::with_ttl(ttl),
            None => StateMap::permanent(),
        };
        // Basic events start out false.
        for node_id in alert_bindings.values() {
            states.set(&arena.node(*node_id).event_id, false);
        }

        tracing::info!(
            fault_tree_id = %config.fault_tree_id,
            top_events = top_events.len(),
            basic_events = alert_bindings.len(),
            nodes = arena.len(),
            "Diagnosis engine initialized"
        );

        Ok(Self {
            tree_id: config.fault_tree_id,
            inner: Mutex::new(EngineInner {
                arena,
                top_events,
                alert_bindings,
                contexts: HashMap::new(),
            }),
            states: Arc::new(states),
            sweep_interval: engine_config.sweep_interval,
            ttl_enabled: engine_config.state_ttl.is_some(),
            callback: RwLock::new(None),
        })
    }

    pub fn tree_id(&self) -> &str {
        &self.tree_id
    }

    /// Exactly one callback per engine; use [`crate::fanout`] for multiple
    /// sinks.
    pub fn set_callback(&self, callback: DiagnosisCallback) {
        let mut slot = self.callback.write().unwrap();
        *slot = Some(callback);
    }

    /// Snapshot of all unexpired event states.
    pub fn event_states(&self) -> HashMap<String, bool> {
        self.states.states()
    }

    pub fn true_events(&self) -> Vec<String> {
        self.states.true_events()
    }

    /// Start the TTL sweeper, when expiry is enabled. The sweeper deletes
    /// expired entries only; it never re-evaluates the tree.
    pub fn start_sweeper(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.ttl_enabled {
            return None;
        }
        Some(spawn_sweeper(
            self.states.clone(),
            self.sweep_interval,
            cancel,
        ))
    }

    /// Feed one alert into the tree. Unknown alert ids are dropped.
    pub fn process_alert(&self, alert: &AlertEvent) {
        let mut inner = self.inner.lock().unwrap();

        let Some(&node_id) = inner.alert_bindings.get(&alert.alert_id) else {
            tracing::debug!(alert_id = %alert.alert_id, "Alert not bound to any basic event");
            return;
        };

        let resolved = alert.is_resolved();
        let event_id = inner.arena.node(node_id).event_id.clone();
        self.states.set(&event_id, !resolved);
        if !resolved {
            tracing::info!(
                alert_id = %alert.alert_id,
                event_id = %event_id,
                source = %alert.source,
                severity = %alert.severity,
                "Basic event set"
            );
        }

        let service_id = alert.meta_str("serviceId").unwrap_or("");
        let service_name = alert.meta_str("serviceName").unwrap_or("");
        self.diagnose(&mut inner, &alert.source, service_id, service_name);
    }

    /// Re-evaluate every top event; emit on each transition.
    fn diagnose(&self, inner: &mut EngineInner, source: &str, service_id: &str, service_name: &str) {
        for top_index in 0..inner.top_events.len() {
            let top = inner.top_events[top_index];
            let top_event_id = inner.arena.node(top).event_id.clone();
            let prev = self.states.get(&top_event_id);
            let state = inner.arena.evaluate(&self.states, top);
            if state != prev {
                self.states.set(&top_event_id, state);
            }

            if state && !prev {
                Self::capture_context(inner, &top_event_id, source, service_id, service_name);
                let context =
                    Self::resolved_context(inner, &top_event_id, source, service_id, service_name);
                let result = self.build_result(inner, top, &context);

                // Keep the firing-time path so the resolution emission can
                // repeat it after the states have dropped back to false.
                if let Some(context) = inner.contexts.get_mut(&top_event_id) {
                    context.trigger_path = result.trigger_path.clone();
                    context.basic_events = result.basic_events.clone();
                }

                tracing::info!(
                    diagnosis_id = %result.diagnosis_id,
                    fault_code = %result.fault_code,
                    top_event = %result.top_event_name,
                    source = %result.source,
                    trigger_path = ?result.trigger_path,
                    "Fault detected"
                );
                self.emit(&result);
            } else if !state && prev {
                let context =
                    Self::resolved_context(inner, &top_event_id, source, service_id, service_name);
                let mut result = self.build_result(inner, top, &context);
                // The tree reads false now; the path of record is the one
                // captured when the fault fired.
                if !context.trigger_path.is_empty() {
                    result.trigger_path = context.trigger_path.clone();
                    result.basic_events = context.basic_events.clone();
                }
                result.metadata.insert(
                    "status".to_string(),
                    serde_json::Value::String(EVENT_STATUS_RESOLVED.to_string()),
                );

                tracing::info!(
                    diagnosis_id = %result.diagnosis_id,
                    fault_code = %result.fault_code,
                    top_event = %result.top_event_name,
                    "Fault resolved"
                );
                inner.contexts.remove(&top_event_id);
                self.emit(&result);
            }
        }
    }

    /// Store the triggering identity; empty values never overwrite.
    fn capture_context(
        inner: &mut EngineInner,
        top_event_id: &str,
        source: &str,
        service_id: &str,
        service_name: &str,
    ) {
        let context = inner.contexts.entry(top_event_id.to_string()).or_default();
        if !source.is_empty() {
            context.source = source.to_string();
        }
        if !service_id.is_empty() {
            context.service_id = service_id.to_string();
        }
        if !service_name.is_empty() {
            context.service_name = service_name.to_string();
        }
    }

    /// Captured context with per-field fallback to the current alert.
    fn resolved_context(
        inner: &EngineInner,
        top_event_id: &str,
        source: &str,
        service_id: &str,
        service_name: &str,
    ) -> TriggerContext {
        let stored = inner.contexts.get(top_event_id);
        let pick = |stored_value: Option<&String>, fallback: &str| -> String {
            match stored_value {
                Some(v) if !v.is_empty() => v.clone(),
                _ => fallback.to_string(),
            }
        };
        TriggerContext {
            source: pick(stored.map(|c| &c.source), source),
            service_id: pick(stored.map(|c| &c.service_id), service_id),
            service_name: pick(stored.map(|c| &c.service_name), service_name),
            trigger_path: stored.map(|c| c.trigger_path.clone()).unwrap_or_default(),
            basic_events: stored.map(|c| c.basic_events.clone()).unwrap_or_default(),
        }
    }

    fn build_result(
        &self,
        inner: &EngineInner,
        top: NodeId,
        context: &TriggerContext,
    ) -> DiagnosisResult {
        let node = inner.arena.node(top);
        let mut result = DiagnosisResult::new(
            self.tree_id.clone(),
            node.event_id.clone(),
            node.name.clone(),
            node.fault_code.clone().unwrap_or_default(),
            node.description.clone(),
        );
        result.source = context.source.clone();

        inner.arena.collect_trigger_path(top, &mut result.trigger_path);
        inner.arena.collect_basic_events(top, &mut result.basic_events);

        if !context.service_id.is_empty() {
            result.metadata.insert(
                "serviceId".to_string(),
                serde_json::Value::String(context.service_id.clone()),
            );
        }
        if !context.service_name.is_empty() {
            result.metadata.insert(
                "serviceName".to_string(),
                serde_json::Value::String(context.service_name.clone()),
            );
        }
        result
    }

    /// Invoke the callback with panic containment, so one misbehaving sink
    /// cannot stop subsequent alerts from being processed.
    fn emit(&self, result: &DiagnosisResult) {
        let callback = self.callback.read().unwrap().clone();
        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                tracing::error!(
                    diagnosis_id = %result.diagnosis_id,
                    fault_code = %result.fault_code,
                    "Diagnosis callback panicked"
                );
            }
        }
    }

    /// Operator override: force one event to false. Does not emit.
    pub fn reset(&self, event_id: &str) {
        let _guard = self.inner.lock().unwrap();
        self.states.reset(event_id);
        tracing::info!(event_id, "Event state reset");
    }

    /// Operator override: clear all event states. Does not emit.
    pub fn reset_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        self.states.reset_all();
        inner.contexts.clear();
        tracing::info!("All event states reset");
    }
}
