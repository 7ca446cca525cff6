//! Recovery execution engine.
//!
//! Dequeues diagnosis results, routes them to a registered [`Action`] by
//! exact or prefix fault-code match, enforces one in-flight recovery per
//! target, runs the action under a deadline, and reports a structured
//! [`RecoveryResult`](faultline_common::types::RecoveryResult) that drives
//! the target's state transition.

pub mod action;
pub mod actions;
pub mod engine;
pub mod state;

pub use action::{Action, ActionContext, Resolver};
pub use actions::{LaunchServiceAction, RuntimeStore, ServicePreset, TrafficBreakerAction};
pub use engine::{RecoveryConfig, RecoveryEngine};
pub use state::{InMemoryStateManager, RecoveryStateManager};

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("Recovery: queue full")]
    QueueFull,

    #[error("Recovery: engine stopped")]
    Closed,

    #[error("Recovery: engine already started")]
    AlreadyStarted,

    #[error("Recovery: empty target id")]
    EmptyTarget,

    #[error("Recovery: state manager error: {0}")]
    State(String),
}
