use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Diagnosis metadata marker for a firing event.
pub const EVENT_STATUS_FIRING: &str = "FIRING";
/// Diagnosis metadata marker for a resolution event.
pub const EVENT_STATUS_RESOLVED: &str = "RESOLVED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Alert lifecycle status. Older producers emit an empty string, which must
/// be read as `Firing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AlertStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AlertStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "" | "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(serde::de::Error::custom(format!(
                "unknown alert status: {other}"
            ))),
        }
    }
}

/// An alert event emitted by the evaluator and consumed by the diagnosis
/// engine.
///
/// For one (`alert_id`, `source`) pair, consecutive events always alternate
/// between `firing` and `resolved`; the hysteresis lives in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub alert_id: String,
    #[serde(default)]
    pub status: AlertStatus,
    pub severity: Severity,
    #[serde(default)]
    pub source: String,
    /// Category tag, e.g. `cpu_high` or `voltage_abnormal`.
    #[serde(rename = "type", default)]
    pub alert_type: String,
    #[serde(default)]
    pub message: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub fault_code: String,
    #[serde(default)]
    pub metric_value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_alerts: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AlertEvent {
    pub fn is_resolved(&self) -> bool {
        self.status == AlertStatus::Resolved
    }

    /// String-typed metadata value, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Result of a fault-tree diagnosis, emitted on every top-event edge.
///
/// `metadata["status"] == "RESOLVED"` marks a resolution emission; anything
/// else (including no status at all) is a firing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis_id: String,
    pub fault_tree_id: String,
    pub top_event_id: String,
    #[serde(default)]
    pub top_event_name: String,
    pub fault_code: String,
    #[serde(default)]
    pub fault_reason: String,
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Event ids from the top event down through every true node.
    #[serde(default)]
    pub trigger_path: Vec<String>,
    /// Basic-event ids currently true under this top event.
    #[serde(default)]
    pub basic_events: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DiagnosisResult {
    pub fn new(
        fault_tree_id: impl Into<String>,
        top_event_id: impl Into<String>,
        top_event_name: impl Into<String>,
        fault_code: impl Into<String>,
        fault_reason: impl Into<String>,
    ) -> Self {
        Self {
            diagnosis_id: crate::id::next_diagnosis_id(),
            fault_tree_id: fault_tree_id.into(),
            top_event_id: top_event_id.into(),
            top_event_name: top_event_name.into(),
            fault_code: fault_code.into(),
            fault_reason: fault_reason.into(),
            source: String::new(),
            timestamp: Utc::now(),
            trigger_path: Vec::new(),
            basic_events: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Inferred event status. Missing metadata means firing; a boolean
    /// `resolved` flag is accepted from older producers.
    pub fn status(&self) -> &str {
        if let Some(s) = self.metadata.get("status").and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return s;
            }
        }
        if let Some(true) = self.metadata.get("resolved").and_then(|v| v.as_bool()) {
            return EVENT_STATUS_RESOLVED;
        }
        EVENT_STATUS_FIRING
    }

    pub fn is_resolved(&self) -> bool {
        self.status() == EVENT_STATUS_RESOLVED
    }

    /// Recovery target: `source`, falling back to `metadata["source"]`.
    pub fn target_id(&self) -> &str {
        if !self.source.is_empty() {
            return &self.source;
        }
        self.metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Terminal status of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryStatus {
    Success,
    Failed,
    Timeout,
    Rejected,
    NoAction,
}

impl std::fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryStatus::Success => "SUCCESS",
            RecoveryStatus::Failed => "FAILED",
            RecoveryStatus::Timeout => "TIMEOUT",
            RecoveryStatus::Rejected => "REJECTED",
            RecoveryStatus::NoAction => "NO_ACTION",
        };
        f.write_str(s)
    }
}

/// Recovery state label of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Recovering,
    Healthy,
    Failed,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetState::Recovering => "RECOVERING",
            TargetState::Healthy => "HEALTHY",
            TargetState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome report for one submitted diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub target_id: String,
    pub fault_code: String,
    pub action: String,
    pub status: RecoveryStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_status_deserializes_as_firing() {
        let raw = r#"{"alert_id":"A1","status":"","severity":"critical","timestamp":0}"#;
        let event: AlertEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.status, AlertStatus::Firing);
        assert!(!event.is_resolved());
    }

    #[test]
    fn missing_status_defaults_to_firing() {
        let raw = r#"{"alert_id":"A1","severity":"info","timestamp":0}"#;
        let event: AlertEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.status, AlertStatus::Firing);
    }

    #[test]
    fn resolved_status_round_trips() {
        let raw = r#"{"alert_id":"A1","status":"resolved","severity":"info","timestamp":0}"#;
        let event: AlertEvent = serde_json::from_str(raw).unwrap();
        assert!(event.is_resolved());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"resolved\""));
    }

    #[test]
    fn diagnosis_status_inference() {
        let mut d = DiagnosisResult::new("ft", "T", "top", "F-1", "reason");
        assert_eq!(d.status(), EVENT_STATUS_FIRING);
        assert!(!d.is_resolved());

        d.metadata
            .insert("resolved".into(), serde_json::Value::Bool(true));
        assert!(d.is_resolved());

        d.metadata
            .insert("status".into(), serde_json::Value::String("RESOLVED".into()));
        assert_eq!(d.status(), EVENT_STATUS_RESOLVED);
    }

    #[test]
    fn diagnosis_target_prefers_source() {
        let mut d = DiagnosisResult::new("ft", "T", "top", "F-1", "");
        assert_eq!(d.target_id(), "");
        d.metadata
            .insert("source".into(), serde_json::Value::String("ctr-7".into()));
        assert_eq!(d.target_id(), "ctr-7");
        d.source = "ctr-9".into();
        assert_eq!(d.target_id(), "ctr-9");
    }

    #[test]
    fn recovery_status_serializes_screaming() {
        let json = serde_json::to_string(&RecoveryStatus::NoAction).unwrap();
        assert_eq!(json, "\"NO_ACTION\"");
    }
}
