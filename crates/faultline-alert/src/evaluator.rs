use crate::rules::{business_field, BandRule};
use crate::trend::{TrendAnalyzer, TrendConfig};
use chrono::Utc;
use faultline_common::metrics::{
    BusinessMetrics, ContainerMetrics, MetricSnapshot, NodeMetrics, ServiceMetrics,
};
use faultline_common::types::{AlertEvent, AlertStatus, Severity};
use faultline_state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Fixed thresholds for the closed microservice rule set.
#[derive(Debug, Clone)]
pub struct ThresholdLimits {
    pub container_cpu_percent: f64,
    pub container_memory_percent: f64,
    pub container_disk_percent: f64,
    pub node_cpu_percent: f64,
    pub node_memory_percent: f64,
    pub node_disk_percent: f64,
}

impl Default for ThresholdLimits {
    fn default() -> Self {
        Self {
            container_cpu_percent: 60.0,
            container_memory_percent: 90.0,
            container_disk_percent: 90.0,
            node_cpu_percent: 60.0,
            node_memory_percent: 90.0,
            node_disk_percent: 90.0,
        }
    }
}

/// Builds a firing or resolved [`AlertEvent`] for one rule site.
struct EventSpec<'a> {
    alert_id: &'a str,
    alert_type: &'a str,
    severity: Severity,
    source: &'a str,
    fault_code: &'a str,
    value: f64,
    firing_message: String,
    resolved_message: String,
    metadata: HashMap<String, serde_json::Value>,
}

impl EventSpec<'_> {
    fn build(self, firing: bool) -> AlertEvent {
        AlertEvent {
            alert_id: self.alert_id.to_string(),
            status: if firing {
                AlertStatus::Firing
            } else {
                AlertStatus::Resolved
            },
            // Resolution notices are informational regardless of the rule's
            // own severity.
            severity: if firing { self.severity } else { Severity::Info },
            source: self.source.to_string(),
            alert_type: self.alert_type.to_string(),
            message: if firing {
                self.firing_message
            } else {
                self.resolved_message
            },
            timestamp: Utc::now().timestamp(),
            fault_code: self.fault_code.to_string(),
            metric_value: self.value,
            related_alerts: Vec::new(),
            metadata: self.metadata,
        }
    }
}

/// Stateless rule evaluation over typed snapshots. Hysteresis is carried
/// entirely by the store's alert map.
pub struct AlertEvaluator {
    store: Arc<StateStore>,
    limits: ThresholdLimits,
    bands: Vec<BandRule>,
    trend: TrendAnalyzer,
}

impl AlertEvaluator {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self::with_rules(
            store,
            ThresholdLimits::default(),
            BandRule::default_rules(),
            TrendConfig::default(),
        )
    }

    pub fn with_rules(
        store: Arc<StateStore>,
        limits: ThresholdLimits,
        bands: Vec<BandRule>,
        trend: TrendConfig,
    ) -> Self {
        Self {
            trend: TrendAnalyzer::new(store.clone(), trend),
            store,
            limits,
            bands,
        }
    }

    /// Evaluate every rule that applies to `snapshot`, returning only the
    /// edge-triggered events. Trend analysis runs for microservice targets
    /// after the threshold checks.
    pub fn evaluate_snapshot(&self, snapshot: &MetricSnapshot) -> Vec<AlertEvent> {
        match snapshot {
            MetricSnapshot::Node(m) => {
                let mut events = self.evaluate_node(m);
                events.extend(self.trend.analyze_node(&m.id));
                events
            }
            MetricSnapshot::Container(m) => {
                let mut events = self.evaluate_container(m);
                events.extend(self.trend.analyze_container(&m.id));
                events
            }
            MetricSnapshot::Service(m) => {
                let mut events = self.evaluate_service(m);
                events.extend(self.trend.analyze_service(&m.id));
                events
            }
            MetricSnapshot::Business(m) => self.evaluate_business(m),
        }
    }

    fn edge(&self, alert_id: &str, source: &str, firing: bool) -> Option<bool> {
        let (changed, is_firing) = self.store.check_and_update_alert(alert_id, source, firing);
        changed.then_some(is_firing)
    }

    pub fn evaluate_container(&self, m: &ContainerMetrics) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let metadata = container_metadata(m);

        let cpu = m.cpu_usage.total;
        if let Some(firing) = self.edge("CONTAINER_CPU_HIGH", &m.id, cpu > self.limits.container_cpu_percent) {
            events.push(
                EventSpec {
                    alert_id: "CONTAINER_CPU_HIGH",
                    alert_type: "cpu_high",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "CONTAINER-RESOURCE-001",
                    value: cpu,
                    firing_message: format!("container cpu usage too high: {cpu:.2}%"),
                    resolved_message: format!("container cpu usage back to normal: {cpu:.2}%"),
                    metadata: metadata.clone(),
                }
                .build(firing),
            );
        }

        let memory = m.memory_used_percent();
        if let Some(firing) = self.edge(
            "CONTAINER_MEMORY_HIGH",
            &m.id,
            memory > self.limits.container_memory_percent,
        ) {
            events.push(
                EventSpec {
                    alert_id: "CONTAINER_MEMORY_HIGH",
                    alert_type: "memory_high",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "CONTAINER-RESOURCE-001",
                    value: memory,
                    firing_message: format!("container memory usage too high: {memory:.2}%"),
                    resolved_message: format!("container memory usage back to normal: {memory:.2}%"),
                    metadata: metadata.clone(),
                }
                .build(firing),
            );
        }

        let disk = m.disk_used_percent();
        if let Some(firing) = self.edge(
            "CONTAINER_DISK_HIGH",
            &m.id,
            disk > self.limits.container_disk_percent,
        ) {
            events.push(
                EventSpec {
                    alert_id: "CONTAINER_DISK_HIGH",
                    alert_type: "disk_high",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "CONTAINER-RESOURCE-001",
                    value: disk,
                    firing_message: format!("container disk usage too high: {disk:.2}%"),
                    resolved_message: format!("container disk usage back to normal: {disk:.2}%"),
                    metadata: metadata.clone(),
                }
                .build(firing),
            );
        }

        let deploy_failed = !m.deploy_status.eq_ignore_ascii_case("success");
        if let Some(firing) = self.edge("CONTAINER_DEPLOY_FAILED", &m.id, deploy_failed) {
            let detail = m
                .failed_message
                .as_deref()
                .unwrap_or("no failure detail reported");
            events.push(
                EventSpec {
                    alert_id: "CONTAINER_DEPLOY_FAILED",
                    alert_type: "deploy_failed",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "CONTAINER-DEPLOY-001",
                    value: 0.0,
                    firing_message: format!(
                        "container deploy status is {}: {detail}",
                        m.deploy_status
                    ),
                    resolved_message: "container deploy status back to success".to_string(),
                    metadata: metadata.clone(),
                }
                .build(firing),
            );
        }

        events
    }

    pub fn evaluate_service(&self, m: &ServiceMetrics) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        if let Some(firing) = self.edge("SERVICE_UNHEALTHY", &m.id, !m.healthy) {
            events.push(
                EventSpec {
                    alert_id: "SERVICE_UNHEALTHY",
                    alert_type: "service_unhealthy",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "SERVICE-HEALTH-001",
                    value: 0.0,
                    firing_message: format!("service {} reported unhealthy", m.id),
                    resolved_message: format!("service {} healthy again", m.id),
                    metadata: HashMap::new(),
                }
                .build(firing),
            );
        }

        if let Some(firing) = self.edge("SERVICE_NO_INSTANCE", &m.id, m.instance_online == 0) {
            events.push(
                EventSpec {
                    alert_id: "SERVICE_NO_INSTANCE",
                    alert_type: "service_no_instance",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "SERVICE-INSTANCE-001",
                    value: m.instance_online as f64,
                    firing_message: format!("service {} has no online instance", m.id),
                    resolved_message: format!(
                        "service {} has {} online instances again",
                        m.id, m.instance_online
                    ),
                    metadata: HashMap::new(),
                }
                .build(firing),
            );
        }

        events
    }

    pub fn evaluate_node(&self, m: &NodeMetrics) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        let cpu = m.cpu_usage.total;
        if let Some(firing) = self.edge("NODE_CPU_HIGH", &m.id, cpu > self.limits.node_cpu_percent) {
            events.push(
                EventSpec {
                    alert_id: "NODE_CPU_HIGH",
                    alert_type: "cpu_high",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "NODE-RESOURCE-001",
                    value: cpu,
                    firing_message: format!("node cpu usage too high: {cpu:.2}%"),
                    resolved_message: format!("node cpu usage back to normal: {cpu:.2}%"),
                    metadata: HashMap::new(),
                }
                .build(firing),
            );
        }

        let memory = m.memory_used_percent();
        if let Some(firing) = self.edge(
            "NODE_MEMORY_HIGH",
            &m.id,
            memory > self.limits.node_memory_percent,
        ) {
            events.push(
                EventSpec {
                    alert_id: "NODE_MEMORY_HIGH",
                    alert_type: "memory_high",
                    severity: Severity::Critical,
                    source: &m.id,
                    fault_code: "NODE-RESOURCE-001",
                    value: memory,
                    firing_message: format!("node memory usage too high: {memory:.2}%"),
                    resolved_message: format!("node memory usage back to normal: {memory:.2}%"),
                    metadata: HashMap::new(),
                }
                .build(firing),
            );
        }

        let disk = m.disk_used_percent();
        if let Some(firing) = self.edge("NODE_DISK_HIGH", &m.id, disk > self.limits.node_disk_percent)
        {
            events.push(
                EventSpec {
                    alert_id: "NODE_DISK_HIGH",
                    alert_type: "disk_high",
                    severity: Severity::Warning,
                    source: &m.id,
                    fault_code: "NODE-RESOURCE-001",
                    value: disk,
                    firing_message: format!("node disk usage too high: {disk:.2}%"),
                    resolved_message: format!("node disk usage back to normal: {disk:.2}%"),
                    metadata: HashMap::new(),
                }
                .build(firing),
            );
        }

        events
    }

    pub fn evaluate_business(&self, m: &BusinessMetrics) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let component = m.component.name();

        for rule in &self.bands {
            if rule.component != component {
                continue;
            }
            let Some(value) = business_field(m, &rule.field) else {
                tracing::warn!(
                    component,
                    field = %rule.field,
                    "Band rule references unknown reading, skipping"
                );
                continue;
            };

            let out_of_band = value < rule.min || value > rule.max;
            if let Some(firing) = self.edge(&rule.alert_id, "", out_of_band) {
                events.push(
                    EventSpec {
                        alert_id: &rule.alert_id,
                        alert_type: "band_breach",
                        severity: rule.severity,
                        source: component,
                        fault_code: &rule.fault_code,
                        value,
                        firing_message: format!(
                            "{} {} out of band: {value:.2} (expected [{}, {}])",
                            component, rule.field, rule.min, rule.max
                        ),
                        resolved_message: format!(
                            "{} {} back in band: {value:.2}",
                            component, rule.field
                        ),
                        metadata: HashMap::new(),
                    }
                    .build(firing),
                );
            }
        }

        events
    }
}

fn container_metadata(m: &ContainerMetrics) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    if !m.service_id.is_empty() {
        metadata.insert(
            "serviceId".to_string(),
            serde_json::Value::String(m.service_id.clone()),
        );
    }
    if !m.service_name.is_empty() {
        metadata.insert(
            "serviceName".to_string(),
            serde_json::Value::String(m.service_name.clone()),
        );
    }
    metadata
}
