use faultline_alert::BandRule;
use faultline_recovery::ServicePreset;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_fault_tree_path")]
    pub fault_tree_path: String,

    #[serde(default)]
    pub alert: AlertSection,
    #[serde(default)]
    pub diagnosis: DiagnosisSection,
    #[serde(default)]
    pub recovery: RecoverySection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub snapshot: SnapshotSection,
}

#[derive(Debug, Deserialize)]
pub struct AlertSection {
    #[serde(default = "default_alert_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    /// Band rules for the business bus; the built-in table is used when
    /// empty.
    #[serde(default)]
    pub band_rules: Vec<BandRule>,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_alert_queue_capacity(),
            ring_capacity: default_ring_capacity(),
            band_rules: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DiagnosisSection {
    /// Event-state TTL in seconds; unset keeps states until changed.
    #[serde(default)]
    pub state_ttl_secs: Option<u64>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DiagnosisSection {
    fn default() -> Self {
        Self {
            state_ttl_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecoverySection {
    #[serde(default = "default_recovery_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_orchestrator_url")]
    pub orchestrator_url: String,
    /// fault_code (or trigger-path event id) → replacement-service preset.
    #[serde(default)]
    pub presets: HashMap<String, ServicePreset>,
    /// Fault-code prefixes routed to the traffic breaker.
    #[serde(default = "default_breaker_prefixes")]
    pub breaker_prefixes: Vec<String>,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            queue_capacity: default_recovery_queue_capacity(),
            action_timeout_ms: default_action_timeout_ms(),
            orchestrator_url: default_orchestrator_url(),
            presets: HashMap::new(),
            breaker_prefixes: default_breaker_prefixes(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PollSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_orchestrator_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_orchestrator_url(),
            interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SnapshotSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_snapshot_path")]
    pub path: String,
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_snapshot_retention_secs")]
    pub retention_secs: u64,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_snapshot_path(),
            interval_secs: default_snapshot_interval_secs(),
            retention_secs: default_snapshot_retention_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8088
}

fn default_fault_tree_path() -> String {
    "configs/fault_tree.json".to_string()
}

fn default_alert_queue_capacity() -> usize {
    500
}

fn default_ring_capacity() -> usize {
    600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_recovery_queue_capacity() -> usize {
    200
}

fn default_action_timeout_ms() -> u64 {
    10_000
}

fn default_orchestrator_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_breaker_prefixes() -> Vec<String> {
    vec!["CONTAINER-".to_string()]
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_snapshot_path() -> String {
    "data/snapshots.db".to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    60
}

fn default_snapshot_retention_secs() -> u64 {
    600
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.http_port, 8088);
        assert_eq!(config.alert.queue_capacity, 500);
        assert_eq!(config.alert.ring_capacity, 600);
        assert_eq!(config.recovery.queue_capacity, 200);
        assert_eq!(config.recovery.action_timeout_ms, 10_000);
        assert!(config.diagnosis.state_ttl_secs.is_none());
        assert!(!config.poll.enabled);
        assert!(!config.snapshot.enabled);
    }

    #[test]
    fn sections_parse_with_overrides() {
        let raw = r#"
            http_port = 9001
            fault_tree_path = "trees/platform.json"

            [alert]
            queue_capacity = 64

            [[alert.band_rules]]
            alert_id = "BATTERY_VOLTAGE_ALERT"
            component = "power"
            field = "battery_voltage"
            min = 20.0
            max = 30.0
            severity = "critical"
            fault_code = "POWER-VOLTAGE-001"

            [diagnosis]
            state_ttl_secs = 300

            [recovery]
            action_timeout_ms = 2000
            breaker_prefixes = ["CONTAINER-", "NODE-"]

            [recovery.presets.SERVICE-RELAUNCH-001]
            name = "payments"
            image_ref = "registry/payments:stable"
            node_names = ["edge-1"]

            [poll]
            enabled = true
            base_url = "http://orchestrator:3001"
            interval_secs = 10
        "#;
        let config: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.http_port, 9001);
        assert_eq!(config.alert.band_rules.len(), 1);
        assert_eq!(config.diagnosis.state_ttl_secs, Some(300));
        assert_eq!(config.recovery.breaker_prefixes.len(), 2);
        assert_eq!(
            config.recovery.presets["SERVICE-RELAUNCH-001"].image_ref,
            "registry/payments:stable"
        );
        assert!(config.poll.enabled);
        assert_eq!(config.poll.interval_secs, 10);
    }
}
