//! Threshold and trend evaluation over metric snapshots.
//!
//! The evaluator itself is stateless: it computes `is_firing` per rule and
//! asks the state store's alert map whether that constitutes an edge. Only
//! edges produce [`AlertEvent`]s, so downstream consumers see a strictly
//! alternating firing/resolved stream per (rule, target).
//!
//! Microservice rules (node / container / service) are a hard-coded closed
//! set; business-bus rules are table-driven band checks loaded from config.

pub mod evaluator;
pub mod rules;
pub mod trend;

#[cfg(test)]
mod tests;

pub use evaluator::{AlertEvaluator, ThresholdLimits};
pub use rules::BandRule;
pub use trend::{TrendAnalyzer, TrendConfig};
