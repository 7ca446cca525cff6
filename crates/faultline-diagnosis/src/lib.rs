//! Fault-tree diagnosis engine.
//!
//! Loads a fault-tree description (AND/OR/NOT gates over alert-driven basic
//! events), tracks per-event boolean state, re-evaluates every top event on
//! each incoming alert, and emits an edge-triggered [`DiagnosisResult`] with
//! the trigger path whenever a top event changes state.

pub mod config;
pub mod engine;
pub mod state;
pub mod tree;

#[cfg(test)]
mod tests;

pub use config::{BasicEventConfig, EventConfig, FaultTreeConfig, GateType};
pub use engine::{DiagnosisCallback, DiagnosisConfig, DiagnosisEngine};
pub use state::{spawn_sweeper, StateMap};

use faultline_common::types::DiagnosisResult;
use std::sync::Arc;

/// Errors raised while loading or building a fault tree. All of them are
/// fatal at initialization; the engine has no recoverable construction path.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("Diagnosis: failed to read fault tree config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Diagnosis: failed to parse fault tree config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Diagnosis: fault_tree_id must not be empty")]
    MissingTreeId,

    #[error("Diagnosis: fault tree needs at least one top event")]
    NoTopEvents,

    #[error("Diagnosis: fault tree needs at least one basic event")]
    NoBasicEvents,

    #[error("Diagnosis: event id must not be empty")]
    EmptyEventId,

    #[error("Diagnosis: duplicate event id {0}")]
    DuplicateEventId(String),

    #[error("Diagnosis: top event {0} has no fault code")]
    MissingFaultCode(String),

    #[error("Diagnosis: basic event {0} has no alert id")]
    MissingAlertId(String),

    #[error("Diagnosis: alert {alert_id} is bound to both {first} and {second}")]
    DuplicateAlertBinding {
        alert_id: String,
        first: String,
        second: String,
    },

    #[error("Diagnosis: event {parent} references unknown child {child}")]
    MissingChild { parent: String, child: String },

    #[error("Diagnosis: fault tree contains a cycle through {0}")]
    CycleDetected(String),
}

/// Chain several diagnosis sinks behind the engine's single callback slot.
pub fn fanout(sinks: Vec<DiagnosisCallback>) -> DiagnosisCallback {
    Arc::new(move |result: &DiagnosisResult| {
        for sink in &sinks {
            sink(result);
        }
    })
}
