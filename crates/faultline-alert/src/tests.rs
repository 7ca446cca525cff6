use crate::evaluator::{AlertEvaluator, ThresholdLimits};
use crate::rules::BandRule;
use crate::trend::{classify, TrendConfig};
use chrono::Utc;
use faultline_common::metrics::{
    BusinessMetrics, BusinessPayload, ComponentKind, ContainerMetrics, CpuUsage, MetricSnapshot,
    PowerReadings, ServiceMetrics,
};
use faultline_common::types::{AlertStatus, Severity};
use faultline_state::StateStore;
use std::sync::Arc;

fn container(id: &str, cpu: f64) -> ContainerMetrics {
    ContainerMetrics {
        id: id.to_string(),
        status: "running".into(),
        uptime_secs: 1000,
        deploy_status: "success".into(),
        failed_message: None,
        restart_count: 0,
        deploy_num: 1,
        cpu_usage: CpuUsage {
            total: cpu,
            cores: vec![],
        },
        memory_limit: 1000,
        memory_usage: 100,
        size_usage: 10,
        size_limit: 100,
        service_id: "svc-1".into(),
        service_name: "payments".into(),
        timestamp: Utc::now().timestamp(),
    }
}

fn power(battery_voltage: f64) -> BusinessMetrics {
    BusinessMetrics {
        component: ComponentKind::Power,
        timestamp: Utc::now().timestamp(),
        payload: BusinessPayload::Power(PowerReadings {
            supply_module_voltage: 13.0,
            battery_voltage,
            bus_voltage: 26.0,
            cpu_board_voltage: 3.3,
            reference_voltage: 5.0,
            bracket_current: 1.2,
            load_current: 1.0,
        }),
    }
}

fn evaluator() -> (Arc<StateStore>, AlertEvaluator) {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::new(store.clone());
    (store, eval)
}

fn firing_only(events: Vec<faultline_common::types::AlertEvent>) -> Vec<faultline_common::types::AlertEvent> {
    events
        .into_iter()
        .filter(|e| e.status == AlertStatus::Firing)
        .collect()
}

#[test]
fn container_cpu_fires_once_then_resolves() {
    let (_store, eval) = evaluator();

    // The first evaluation of an unseen rule is always an edge, so the
    // healthy rules emit an initial resolved notice alongside the firing.
    let events = firing_only(eval.evaluate_container(&container("c1", 95.0)));
    assert_eq!(events.len(), 1);
    let firing = &events[0];
    assert_eq!(firing.alert_id, "CONTAINER_CPU_HIGH");
    assert_eq!(firing.severity, Severity::Critical);
    assert_eq!(firing.source, "c1");
    assert_eq!(firing.meta_str("serviceName"), Some("payments"));

    // Still firing, nothing else changed: hysteresis suppresses everything.
    assert!(eval.evaluate_container(&container("c1", 96.0)).is_empty());

    // Back under the threshold: exactly one resolved event.
    let events = eval.evaluate_container(&container("c1", 10.0));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, "CONTAINER_CPU_HIGH");
    assert_eq!(events[0].status, AlertStatus::Resolved);
    assert_eq!(events[0].severity, Severity::Info);
}

#[test]
fn container_alerts_are_independent_per_source() {
    let (_store, eval) = evaluator();
    assert_eq!(
        firing_only(eval.evaluate_container(&container("c1", 95.0))).len(),
        1
    );
    assert_eq!(
        firing_only(eval.evaluate_container(&container("c2", 95.0))).len(),
        1
    );
}

#[test]
fn deploy_failure_carries_detail() {
    let (_store, eval) = evaluator();
    let mut m = container("c1", 10.0);
    m.deploy_status = "failed".into();
    m.failed_message = Some("image pull backoff".into());

    let events = eval.evaluate_container(&m);
    let deploy = events
        .iter()
        .find(|e| e.alert_id == "CONTAINER_DEPLOY_FAILED")
        .expect("deploy alert");
    assert!(deploy.message.contains("image pull backoff"));
    assert_eq!(deploy.fault_code, "CONTAINER-DEPLOY-001");
}

#[test]
fn service_zero_instances_fires() {
    let (_store, eval) = evaluator();
    let m = ServiceMetrics {
        id: "svc-1".into(),
        status: "running".into(),
        healthy: true,
        factor: 1,
        policy: String::new(),
        instance_online: 0,
        instance_active: 0,
        check_success: 0,
        check_fail: 0,
        timestamp: Utc::now().timestamp(),
    };
    let events = firing_only(eval.evaluate_service(&m));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, "SERVICE_NO_INSTANCE");
}

#[test]
fn band_rule_fires_on_out_of_band_voltage() {
    let (_store, eval) = evaluator();

    let events = firing_only(eval.evaluate_business(&power(18.0)));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, "BATTERY_VOLTAGE_ALERT");
    assert_eq!(events[0].fault_code, "POWER-VOLTAGE-001");
    assert_eq!(events[0].metric_value, 18.0);

    // Unchanged condition emits nothing; recovery emits a resolution.
    assert!(eval.evaluate_business(&power(18.5)).is_empty());
    let events = eval.evaluate_business(&power(25.0));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alert_id, "BATTERY_VOLTAGE_ALERT");
    assert_eq!(events[0].status, AlertStatus::Resolved);
}

#[test]
fn custom_band_table_replaces_defaults() {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::with_rules(
        store,
        ThresholdLimits::default(),
        vec![BandRule {
            alert_id: "REF_VOLTAGE_ALERT".into(),
            component: "power".into(),
            field: "reference_voltage".into(),
            min: 4.5,
            max: 5.5,
            severity: Severity::Warning,
            fault_code: "POWER-VOLTAGE-002".into(),
        }],
        TrendConfig::default(),
    );

    // Battery voltage is far out of the default band, but only the custom
    // rule is installed, and its reading is in band.
    let events = eval.evaluate_business(&power(2.0));
    assert!(events.iter().all(|e| e.alert_id == "REF_VOLTAGE_ALERT"));
    assert!(events.iter().all(|e| e.status == AlertStatus::Resolved));
}

#[test]
fn classify_requires_majority() {
    let up = [1.0, 2.0, 3.0, 4.0, 5.0];
    let info = classify(&up);
    assert!(info.increasing);
    assert_eq!(info.run, 4);
    assert!(info.change_rate > 0.0);

    let flat = [5.0, 5.0, 5.0, 5.0];
    let info = classify(&flat);
    assert!(!info.increasing);
    assert!(!info.decreasing);

    let down = [5.0, 4.0, 3.0, 2.0];
    assert!(classify(&down).decreasing);

    let mixed = [1.0, 2.0, 1.0, 2.0, 1.0];
    let info = classify(&mixed);
    // Two rises, two falls over five samples: no majority.
    assert!(!info.increasing && !info.decreasing);
}

#[test]
fn classify_skips_zero_denominators() {
    let values = [0.0, 1.0, 2.0, 3.0];
    let info = classify(&values);
    assert!(info.increasing);
    assert!(info.change_rate.is_finite());
}

#[test]
fn rising_cpu_series_emits_trend_warning() {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::new(store.clone());
    let now = Utc::now().timestamp();

    // Twelve samples climbing toward the predictive band.
    for i in 0..12 {
        let mut m = container("c1", 50.0 + 3.0 * i as f64);
        m.timestamp = now - (12 - i);
        store.update(MetricSnapshot::Container(m));
    }

    let events = eval.evaluate_snapshot(&MetricSnapshot::Container(container("c1", 86.0)));
    let trend = events
        .iter()
        .find(|e| e.alert_id == "TREND_CONTAINER_CPU")
        .expect("trend alert");
    assert_eq!(trend.status, AlertStatus::Firing);
    assert_eq!(trend.severity, Severity::Warning);
    assert_eq!(trend.fault_code, "TREND_CPU_INCREASE");
    assert_eq!(trend.meta_str("trend_type"), Some("increasing"));
    assert!(trend.meta_str("prediction").is_some());
}

#[test]
fn short_history_produces_no_trend_alert() {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::new(store.clone());
    let now = Utc::now().timestamp();

    for i in 0..5 {
        let mut m = container("c1", 50.0 + 10.0 * i as f64);
        m.timestamp = now - (5 - i);
        store.update(MetricSnapshot::Container(m));
    }

    let events: Vec<_> = eval
        .evaluate_snapshot(&MetricSnapshot::Container(container("c1", 10.0)))
        .into_iter()
        .filter(|e| e.alert_id.starts_with("TREND_"))
        .collect();
    assert!(events.is_empty());
}

#[test]
fn uptime_drops_count_as_restarts() {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::new(store.clone());
    let now = Utc::now().timestamp();

    // Uptime resets twice within the window.
    let uptimes = [100, 200, 10, 110, 5, 100, 200, 300, 400, 500, 600];
    for (i, up) in uptimes.iter().enumerate() {
        let mut m = container("c1", 10.0);
        m.uptime_secs = *up;
        m.timestamp = now - (uptimes.len() - i) as i64;
        store.update(MetricSnapshot::Container(m));
    }

    let events = eval.evaluate_snapshot(&MetricSnapshot::Container(container("c1", 10.0)));
    let restart = events
        .iter()
        .find(|e| e.alert_id == "TREND_CONTAINER_RESTART")
        .expect("restart alert");
    assert_eq!(restart.status, AlertStatus::Firing);
    assert_eq!(restart.metric_value, 2.0);
}

#[test]
fn rising_validation_failures_emit_trend_alert() {
    let store = Arc::new(StateStore::new());
    let eval = AlertEvaluator::new(store.clone());
    let now = Utc::now().timestamp();

    for i in 0..12i64 {
        let m = ServiceMetrics {
            id: "svc-1".into(),
            status: "running".into(),
            healthy: true,
            factor: 1,
            policy: String::new(),
            instance_online: 2,
            instance_active: 2,
            check_success: 100,
            check_fail: i * 2,
            timestamp: now - (12 - i),
        };
        store.update(MetricSnapshot::Service(m));
    }

    let current = ServiceMetrics {
        id: "svc-1".into(),
        status: "running".into(),
        healthy: true,
        factor: 1,
        policy: String::new(),
        instance_online: 2,
        instance_active: 2,
        check_success: 100,
        check_fail: 24,
        timestamp: now,
    };
    let events = eval.evaluate_snapshot(&MetricSnapshot::Service(current));
    let trend = events
        .iter()
        .find(|e| e.alert_id == "TREND_SERVICE_VALIDATION")
        .expect("validation trend alert");
    assert_eq!(trend.fault_code, "TREND_VALIDATION_FAILURE");
}
