//! End-to-end diagnosis scenarios: gate combinations, edge-triggered
//! emission, context retention across a fault's lifetime, and callback
//! isolation.

use faultline_common::types::{AlertEvent, AlertStatus, DiagnosisResult, Severity};
use faultline_diagnosis::{fanout, DiagnosisConfig, DiagnosisEngine, FaultTreeConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn engine(json: &str) -> DiagnosisEngine {
    DiagnosisEngine::new(FaultTreeConfig::from_slice(json.as_bytes()).unwrap()).unwrap()
}

fn collect(engine: &DiagnosisEngine) -> Arc<Mutex<Vec<DiagnosisResult>>> {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let captured = sink.clone();
    engine.set_callback(Arc::new(move |result: &DiagnosisResult| {
        captured.lock().unwrap().push(result.clone());
    }));
    sink
}

fn alert(alert_id: &str, firing: bool, source: &str) -> AlertEvent {
    AlertEvent {
        alert_id: alert_id.to_string(),
        status: if firing {
            AlertStatus::Firing
        } else {
            AlertStatus::Resolved
        },
        severity: Severity::Critical,
        source: source.to_string(),
        alert_type: "test".into(),
        message: String::new(),
        timestamp: 0,
        fault_code: String::new(),
        metric_value: 0.0,
        related_alerts: vec![],
        metadata: HashMap::new(),
    }
}

fn alert_with_service(alert_id: &str, firing: bool, source: &str, service: &str) -> AlertEvent {
    let mut event = alert(alert_id, firing, source);
    event.metadata.insert(
        "serviceId".into(),
        serde_json::Value::String(service.to_string()),
    );
    event.metadata.insert(
        "serviceName".into(),
        serde_json::Value::String(format!("{service}-name")),
    );
    event
}

const AND_TREE: &str = r#"{
    "fault_tree_id": "ft-and",
    "top_events": [
        {"event_id": "T", "name": "combined failure", "description": "both legs down",
         "fault_code": "F-AND", "gate_type": "AND", "children": ["E1", "E2"]}
    ],
    "basic_events": [
        {"event_id": "E1", "alert_id": "A1"},
        {"event_id": "E2", "alert_id": "A2"}
    ]
}"#;

const NOT_TREE: &str = r#"{
    "fault_tree_id": "ft-not",
    "top_events": [
        {"event_id": "T", "name": "standby missing", "fault_code": "F-NOT",
         "gate_type": "AND", "children": ["E1", "NOT-E2"]}
    ],
    "basic_events": [
        {"event_id": "E1", "alert_id": "A1"},
        {"event_id": "E2", "alert_id": "A2"}
    ]
}"#;

const OR_TREE: &str = r#"{
    "fault_tree_id": "ft-or",
    "top_events": [
        {"event_id": "T", "name": "either failure", "fault_code": "F-OR",
         "gate_type": "OR", "children": ["E1", "E2"]}
    ],
    "basic_events": [
        {"event_id": "E1", "alert_id": "A1"},
        {"event_id": "E2", "alert_id": "A2"}
    ]
}"#;

#[test]
fn simple_and_fires_resolves_and_keeps_context() {
    let engine = engine(AND_TREE);
    let sink = collect(&engine);

    // One leg down: no emission.
    engine.process_alert(&alert("A1", true, "ctr-1"));
    assert!(sink.lock().unwrap().is_empty());

    // Second leg: the top event fires with the full path.
    engine.process_alert(&alert("A2", true, "ctr-1"));
    {
        let results = sink.lock().unwrap();
        assert_eq!(results.len(), 1);
        let firing = &results[0];
        assert_eq!(firing.fault_code, "F-AND");
        assert_eq!(firing.top_event_id, "T");
        assert_eq!(firing.source, "ctr-1");
        assert_eq!(firing.trigger_path, vec!["T", "E1", "E2"]);
        assert_eq!(firing.basic_events, vec!["E1", "E2"]);
        assert!(!firing.is_resolved());
    }

    // One leg recovers: resolved emission reusing the firing-time shape,
    // including the trigger path captured when the fault fired.
    engine.process_alert(&alert("A1", false, "ctr-1"));
    {
        let results = sink.lock().unwrap();
        assert_eq!(results.len(), 2);
        let resolved = &results[1];
        assert!(resolved.is_resolved());
        assert_eq!(resolved.fault_code, "F-AND");
        assert_eq!(resolved.source, "ctr-1");
        assert_eq!(resolved.trigger_path, vec!["T", "E1", "E2"]);
        assert_eq!(resolved.basic_events, vec!["E1", "E2"]);
    }

    // The other leg recovering produces nothing new.
    engine.process_alert(&alert("A2", false, "ctr-1"));
    assert_eq!(sink.lock().unwrap().len(), 2);
}

#[test]
fn not_gate_appears_on_trigger_path() {
    let engine = engine(NOT_TREE);
    let sink = collect(&engine);

    // E1 true, E2 false: NOT-E2 is true, the top fires.
    engine.process_alert(&alert("A1", true, "ctr-1"));
    {
        let results = sink.lock().unwrap();
        assert_eq!(results.len(), 1);
        let path = &results[0].trigger_path;
        assert!(path.contains(&"NOT-E2".to_string()), "path was {path:?}");
        assert_eq!(results[0].basic_events, vec!["E1"]);
    }

    // E2 firing kills the NOT leg: resolved emission.
    engine.process_alert(&alert("A2", true, "ctr-1"));
    {
        let results = sink.lock().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_resolved());
    }
}

#[test]
fn or_gate_emits_once_while_any_leg_is_up() {
    let engine = engine(OR_TREE);
    let sink = collect(&engine);

    engine.process_alert(&alert("A2", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    // Already true: firing the other leg changes nothing.
    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    // Still true through E1.
    engine.process_alert(&alert("A2", false, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    // Both legs down: one resolved emission.
    engine.process_alert(&alert("A1", false, "s"));
    let results = sink.lock().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[1].is_resolved());
}

#[test]
fn resolution_reuses_firing_time_service_context() {
    let engine = engine(OR_TREE);
    let sink = collect(&engine);

    engine.process_alert(&alert_with_service("A1", true, "ctr-1", "svc-9"));
    // The resolving alert arrives without service metadata, e.g. from a
    // different evaluator path.
    engine.process_alert(&alert("A1", false, ""));

    {
        let results = sink.lock().unwrap();
        assert_eq!(results.len(), 2);
        let resolved = &results[1];
        assert!(resolved.is_resolved());
        assert_eq!(resolved.source, "ctr-1");
        assert_eq!(resolved.meta_str("serviceId"), Some("svc-9"));
        assert_eq!(resolved.meta_str("serviceName"), Some("svc-9-name"));
    }

    // Context was cleared on resolution: a new cycle captures fresh values.
    engine.process_alert(&alert_with_service("A1", true, "ctr-2", "svc-7"));
    let results = sink.lock().unwrap();
    assert_eq!(results[2].source, "ctr-2");
    assert_eq!(results[2].meta_str("serviceId"), Some("svc-7"));
}

#[test]
fn repeated_alerts_do_not_reemit() {
    // Invariant: identical state transitions produce identical emission
    // sets, and an unchanged top event emits nothing.
    let engine = engine(OR_TREE);
    let sink = collect(&engine);

    engine.process_alert(&alert("A1", true, "s"));
    engine.process_alert(&alert("A1", true, "s"));
    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    engine.process_alert(&alert("A1", false, "s"));
    engine.process_alert(&alert("A1", false, "s"));
    assert_eq!(sink.lock().unwrap().len(), 2);
}

#[test]
fn evaluation_is_idempotent_after_process_alert() {
    let engine = engine(AND_TREE);
    let _sink = collect(&engine);

    engine.process_alert(&alert("A1", true, "s"));
    engine.process_alert(&alert("A2", true, "s"));

    let states = engine.event_states();
    assert_eq!(states.get("T"), Some(&true));

    // Re-processing an unrelated no-op alert leaves the cached state equal
    // to what evaluation would produce again.
    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(engine.event_states().get("T"), Some(&true));
    let mut trues = engine.true_events();
    trues.sort();
    assert_eq!(trues, vec!["E1", "E2", "T"]);
}

#[test]
fn unknown_alert_ids_are_ignored() {
    let engine = engine(AND_TREE);
    let sink = collect(&engine);
    engine.process_alert(&alert("NOT_BOUND", true, "s"));
    assert!(sink.lock().unwrap().is_empty());
    assert!(engine.true_events().is_empty());
}

#[test]
fn reset_does_not_emit() {
    let engine = engine(OR_TREE);
    let sink = collect(&engine);

    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    // Operator override: states drop to false silently.
    engine.reset_all();
    assert_eq!(sink.lock().unwrap().len(), 1);
    assert!(engine.true_events().is_empty());

    // The next firing alert is a fresh false→true edge.
    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 2);
}

#[test]
fn callback_panic_is_contained() {
    let engine = engine(OR_TREE);
    let count = Arc::new(Mutex::new(0usize));
    let count_in_callback = count.clone();
    engine.set_callback(Arc::new(move |result: &DiagnosisResult| {
        *count_in_callback.lock().unwrap() += 1;
        if !result.is_resolved() {
            panic!("sink exploded");
        }
    }));

    // The panicking firing emission must not poison the engine.
    engine.process_alert(&alert("A1", true, "s"));
    engine.process_alert(&alert("A1", false, "s"));
    engine.process_alert(&alert("A2", true, "s"));

    assert_eq!(*count.lock().unwrap(), 3);
}

#[test]
fn fanout_chains_multiple_sinks() {
    let engine = engine(OR_TREE);
    let first = Arc::new(Mutex::new(0usize));
    let second = Arc::new(Mutex::new(0usize));
    let f = first.clone();
    let s = second.clone();
    engine.set_callback(fanout(vec![
        Arc::new(move |_: &DiagnosisResult| *f.lock().unwrap() += 1),
        Arc::new(move |_: &DiagnosisResult| *s.lock().unwrap() += 1),
    ]));

    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(*first.lock().unwrap(), 1);
    assert_eq!(*second.lock().unwrap(), 1);
}

#[test]
fn ttl_expiry_reads_false_and_next_alert_rediagnoses() {
    let config = FaultTreeConfig::from_slice(OR_TREE.as_bytes()).unwrap();
    let engine = DiagnosisEngine::with_config(
        config,
        DiagnosisConfig {
            state_ttl: Some(Duration::from_millis(30)),
            sweep_interval: Duration::from_millis(10),
        },
    )
    .unwrap();
    let sink = collect(&engine);

    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 1);

    // Both the basic and the top event expire. Expiry alone emits nothing;
    // the next alert re-fires the edge.
    std::thread::sleep(Duration::from_millis(60));
    assert!(engine.true_events().is_empty());
    assert_eq!(sink.lock().unwrap().len(), 1);

    engine.process_alert(&alert("A1", true, "s"));
    assert_eq!(sink.lock().unwrap().len(), 2);
}

#[test]
fn empty_status_string_counts_as_firing() {
    let engine = engine(OR_TREE);
    let sink = collect(&engine);

    let raw = r#"{"alert_id": "A1", "status": "", "severity": "critical",
                  "source": "s", "timestamp": 0}"#;
    let event: AlertEvent = serde_json::from_str(raw).unwrap();
    engine.process_alert(&event);
    assert_eq!(sink.lock().unwrap().len(), 1);
    assert!(!sink.lock().unwrap()[0].is_resolved());
}
