use crate::config::{FaultTreeConfig, GateType};
use crate::state::StateMap;
use crate::tree::EventArena;
use crate::TreeError;
use std::time::Duration;

fn parse(json: &str) -> Result<FaultTreeConfig, TreeError> {
    FaultTreeConfig::from_slice(json.as_bytes())
}

const SIMPLE_AND: &str = r#"{
    "fault_tree_id": "ft-test",
    "top_events": [
        {"event_id": "T", "name": "top", "fault_code": "F-1", "gate_type": "AND",
         "children": ["E1", "E2"]}
    ],
    "intermediate_events": [],
    "basic_events": [
        {"event_id": "E1", "name": "e1", "alert_id": "A1"},
        {"event_id": "E2", "name": "e2", "alert_id": "A2"}
    ]
}"#;

#[test]
fn parses_valid_config() {
    let config = parse(SIMPLE_AND).unwrap();
    assert_eq!(config.fault_tree_id, "ft-test");
    assert_eq!(config.top_events.len(), 1);
    assert_eq!(config.top_events[0].gate_type, GateType::And);
    assert_eq!(config.basic_events.len(), 2);
}

#[test]
fn rejects_empty_tree_id() {
    let json = SIMPLE_AND.replace("ft-test", "");
    assert!(matches!(parse(&json), Err(TreeError::MissingTreeId)));
}

#[test]
fn rejects_missing_top_or_basic_events() {
    let json = r#"{"fault_tree_id": "ft", "top_events": [], "basic_events": []}"#;
    assert!(matches!(parse(json), Err(TreeError::NoTopEvents)));

    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [{"event_id": "T", "fault_code": "F", "gate_type": "OR", "children": []}],
        "basic_events": []
    }"#;
    assert!(matches!(parse(json), Err(TreeError::NoBasicEvents)));
}

#[test]
fn rejects_top_event_without_fault_code() {
    let json = SIMPLE_AND.replace(r#""fault_code": "F-1", "#, "");
    assert!(matches!(parse(&json), Err(TreeError::MissingFaultCode(_))));
}

#[test]
fn rejects_duplicate_alert_binding() {
    let json = SIMPLE_AND.replace(r#""alert_id": "A2""#, r#""alert_id": "A1""#);
    match parse(&json) {
        Err(TreeError::DuplicateAlertBinding { alert_id, .. }) => assert_eq!(alert_id, "A1"),
        other => panic!("expected duplicate binding error, got {other:?}"),
    }
}

#[test]
fn rejects_duplicate_event_id() {
    let json = SIMPLE_AND.replace(r#""event_id": "E2""#, r#""event_id": "E1""#);
    assert!(matches!(parse(&json), Err(TreeError::DuplicateEventId(_))));
}

#[test]
fn build_rejects_unknown_child() {
    let json = SIMPLE_AND.replace(r#""children": ["E1", "E2"]"#, r#""children": ["E1", "E9"]"#);
    let config = parse(&json).unwrap();
    match EventArena::build(&config) {
        Err(TreeError::MissingChild { parent, child }) => {
            assert_eq!(parent, "T");
            assert_eq!(child, "E9");
        }
        other => panic!("expected missing child error, got {other:?}"),
    }
}

#[test]
fn build_rejects_cycles() {
    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [
            {"event_id": "T", "fault_code": "F", "gate_type": "OR", "children": ["M1"]}
        ],
        "intermediate_events": [
            {"event_id": "M1", "gate_type": "OR", "children": ["M2"]},
            {"event_id": "M2", "gate_type": "OR", "children": ["M1", "E1"]}
        ],
        "basic_events": [{"event_id": "E1", "alert_id": "A1"}]
    }"#;
    let config = parse(json).unwrap();
    assert!(matches!(
        EventArena::build(&config),
        Err(TreeError::CycleDetected(_))
    ));
}

#[test]
fn not_prefix_materializes_fresh_node() {
    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [
            {"event_id": "T", "fault_code": "F", "gate_type": "AND",
             "children": ["E1", "NOT-E2"]}
        ],
        "basic_events": [
            {"event_id": "E1", "alert_id": "A1"},
            {"event_id": "E2", "alert_id": "A2"}
        ]
    }"#;
    let config = parse(json).unwrap();
    let built = EventArena::build(&config).unwrap();
    // Two basics + top + one synthetic NOT node.
    assert_eq!(built.arena.len(), 4);

    let top = built.top_events[0];
    let children = &built.arena.node(top).children;
    assert_eq!(children.len(), 2);
    let wrapped = built.arena.node(children[1]);
    assert_eq!(wrapped.event_id, "NOT-E2");
    assert_eq!(wrapped.gate, GateType::Not);
    assert_eq!(wrapped.children.len(), 1);
}

#[test]
fn and_gate_with_zero_children_is_false() {
    // Divergence from classical logic: a childless AND gate stays false.
    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [
            {"event_id": "T", "fault_code": "F", "gate_type": "AND", "children": []}
        ],
        "basic_events": [{"event_id": "E1", "alert_id": "A1"}]
    }"#;
    let config = parse(json).unwrap();
    let mut built = EventArena::build(&config).unwrap();
    let states = StateMap::permanent();
    states.set("E1", true);
    assert!(!built.arena.evaluate(&states, built.top_events[0]));
}

#[test]
fn or_gate_short_circuits_in_declaration_order() {
    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [
            {"event_id": "T", "fault_code": "F", "gate_type": "OR", "children": ["E1", "E2"]}
        ],
        "basic_events": [
            {"event_id": "E1", "alert_id": "A1"},
            {"event_id": "E2", "alert_id": "A2"}
        ]
    }"#;
    let config = parse(json).unwrap();
    let mut built = EventArena::build(&config).unwrap();
    let states = StateMap::permanent();
    states.set("E1", true);
    states.set("E2", true);

    let top = built.top_events[0];
    assert!(built.arena.evaluate(&states, top));

    // E2 was never visited thanks to the short circuit, so only T and E1
    // appear on the trigger path.
    let mut path = Vec::new();
    built.arena.collect_trigger_path(top, &mut path);
    assert_eq!(path, vec!["T", "E1"]);
}

#[test]
fn shared_child_under_two_parents() {
    let json = r#"{
        "fault_tree_id": "ft",
        "top_events": [
            {"event_id": "T1", "fault_code": "F1", "gate_type": "OR", "children": ["E1"]},
            {"event_id": "T2", "fault_code": "F2", "gate_type": "OR", "children": ["E1"]}
        ],
        "basic_events": [{"event_id": "E1", "alert_id": "A1"}]
    }"#;
    let config = parse(json).unwrap();
    let mut built = EventArena::build(&config).unwrap();
    let states = StateMap::permanent();
    states.set("E1", true);

    for i in 0..2 {
        let top = built.top_events[i];
        assert!(built.arena.evaluate(&states, top));
    }
}

#[test]
fn state_map_ttl_expiry() {
    let states = StateMap::with_ttl(Duration::from_millis(20));
    states.set("E1", true);
    assert!(states.get("E1"));

    std::thread::sleep(Duration::from_millis(40));
    assert!(!states.get("E1"), "expired entry must read as false");
    assert_eq!(states.sweep(), 1);
    assert!(states.states().is_empty());
}

#[test]
fn state_map_permanent_entries_never_expire() {
    let states = StateMap::permanent();
    states.set("E1", true);
    std::thread::sleep(Duration::from_millis(20));
    assert!(states.get("E1"));
    assert_eq!(states.sweep(), 0);
    assert_eq!(states.true_events(), vec!["E1".to_string()]);
}

#[test]
fn state_map_per_entry_ttl_override() {
    let states = StateMap::with_ttl(Duration::from_millis(20));
    states.set_with_ttl("pinned", true, Duration::ZERO);
    states.set("fleeting", true);
    std::thread::sleep(Duration::from_millis(40));
    assert!(states.get("pinned"));
    assert!(!states.get("fleeting"));
    assert_eq!(states.sweep(), 1);
}
