use crate::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Gate operator of a non-basic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateType {
    And,
    Or,
    Not,
    /// Pass-through to the first child; used for intermediate events that
    /// directly wrap a basic event.
    Basic,
}

/// Top or intermediate event. `fault_code` is meaningful on top events only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub event_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fault_code: String,
    pub gate_type: GateType,
    /// Child event ids. A `NOT-` prefix wraps the referenced child in an
    /// implicit NOT gate.
    #[serde(default)]
    pub children: Vec<String>,
}

/// Leaf event, driven by one alert stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicEventConfig {
    pub event_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub alert_id: String,
}

/// Fault-tree description as loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultTreeConfig {
    pub fault_tree_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub top_events: Vec<EventConfig>,
    #[serde(default)]
    pub intermediate_events: Vec<EventConfig>,
    #[serde(default)]
    pub basic_events: Vec<BasicEventConfig>,
}

impl FaultTreeConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let data = std::fs::read(path)?;
        Self::from_slice(&data)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, TreeError> {
        let config: FaultTreeConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation. Child references and cycles are checked later
    /// during tree construction, where the node table exists.
    pub fn validate(&self) -> Result<(), TreeError> {
        if self.fault_tree_id.is_empty() {
            return Err(TreeError::MissingTreeId);
        }
        if self.top_events.is_empty() {
            return Err(TreeError::NoTopEvents);
        }
        if self.basic_events.is_empty() {
            return Err(TreeError::NoBasicEvents);
        }

        let mut seen = HashSet::new();
        for event in self.top_events.iter().chain(&self.intermediate_events) {
            if event.event_id.is_empty() {
                return Err(TreeError::EmptyEventId);
            }
            if !seen.insert(event.event_id.clone()) {
                return Err(TreeError::DuplicateEventId(event.event_id.clone()));
            }
        }
        for event in &self.top_events {
            if event.fault_code.is_empty() {
                return Err(TreeError::MissingFaultCode(event.event_id.clone()));
            }
        }

        let mut alert_owner: std::collections::HashMap<&str, &str> = Default::default();
        for basic in &self.basic_events {
            if basic.event_id.is_empty() {
                return Err(TreeError::EmptyEventId);
            }
            if !seen.insert(basic.event_id.clone()) {
                return Err(TreeError::DuplicateEventId(basic.event_id.clone()));
            }
            if basic.alert_id.is_empty() {
                return Err(TreeError::MissingAlertId(basic.event_id.clone()));
            }
            if let Some(first) = alert_owner.insert(&basic.alert_id, &basic.event_id) {
                return Err(TreeError::DuplicateAlertBinding {
                    alert_id: basic.alert_id.clone(),
                    first: first.to_string(),
                    second: basic.event_id.clone(),
                });
            }
        }

        Ok(())
    }
}
