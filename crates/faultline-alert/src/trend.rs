use chrono::Utc;
use faultline_common::metrics::{MetricKind, MetricSnapshot};
use faultline_common::types::{AlertEvent, AlertStatus, Severity};
use faultline_state::StateStore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TrendConfig {
    /// History lookback for every series.
    pub window: chrono::Duration,
    /// Minimum samples before a series is classified at all.
    pub min_samples: usize,
    /// Required consecutive movement count before a direction counts as
    /// sustained.
    pub sustained: usize,
    /// Predictive band: a rising cpu/memory series alerts once the
    /// rate-projected value crosses this.
    pub cpu_predict_percent: f64,
    pub memory_predict_percent: f64,
    /// Validation failure rate (percent) above which a rising series alerts.
    pub fail_rate_percent: f64,
    /// Restarts within the window that count as a restart storm.
    pub restart_limit: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: chrono::Duration::minutes(5),
            min_samples: 10,
            sustained: 3,
            cpu_predict_percent: 80.0,
            memory_predict_percent: 85.0,
            fail_rate_percent: 5.0,
            restart_limit: 2,
        }
    }
}

/// Direction classification of one numeric series.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TrendInfo {
    pub increasing: bool,
    pub decreasing: bool,
    /// Number of moves in the dominant direction.
    pub run: usize,
    /// Average relative change per moving pair.
    pub change_rate: f64,
}

/// Majority vote over adjacent pairs: a direction wins when it accounts for
/// more than half of the transitions. The change rate is the mean of
/// `(x[i] - x[i-1]) / x[i-1]` over the winning moves.
pub(crate) fn classify(values: &[f64]) -> TrendInfo {
    if values.len() < 2 {
        return TrendInfo::default();
    }

    let mut increases = 0usize;
    let mut decreases = 0usize;
    let mut total_change = 0.0;

    for pair in values.windows(2) {
        let diff = pair[1] - pair[0];
        if diff == 0.0 || pair[0].abs() < f64::EPSILON {
            continue;
        }
        if diff > 0.0 {
            increases += 1;
        } else {
            decreases += 1;
        }
        total_change += diff / pair[0];
    }

    let half = values.len() / 2;
    let mut info = TrendInfo::default();
    if increases > half {
        info.increasing = true;
        info.run = increases;
        info.change_rate = total_change / increases as f64;
    } else if decreases > half {
        info.decreasing = true;
        info.run = decreases;
        info.change_rate = total_change / decreases as f64;
    }
    info
}

/// Derives predictive warnings from the per-target history window. Trend
/// alerts use the same edge discipline as threshold alerts, so a trend that
/// flattens out emits a resolution.
pub struct TrendAnalyzer {
    store: Arc<StateStore>,
    config: TrendConfig,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<StateStore>, config: TrendConfig) -> Self {
        Self { store, config }
    }

    fn edge(&self, alert_id: &str, source: &str, firing: bool) -> Option<bool> {
        let (changed, is_firing) = self.store.check_and_update_alert(alert_id, source, firing);
        changed.then_some(is_firing)
    }

    fn trend_event(
        &self,
        alert_id: &str,
        alert_type: &str,
        source: &str,
        fault_code: &str,
        firing: bool,
        value: f64,
        trend: TrendInfo,
        prediction: &str,
        message: String,
    ) -> AlertEvent {
        let mut metadata = HashMap::new();
        metadata.insert(
            "trend_type".to_string(),
            serde_json::Value::String(
                if trend.increasing {
                    "increasing"
                } else if trend.decreasing {
                    "decreasing"
                } else {
                    "stable"
                }
                .to_string(),
            ),
        );
        if let Some(rate) = serde_json::Number::from_f64(trend.change_rate) {
            metadata.insert("change_rate".to_string(), serde_json::Value::Number(rate));
        }
        if firing && !prediction.is_empty() {
            metadata.insert(
                "prediction".to_string(),
                serde_json::Value::String(prediction.to_string()),
            );
        }

        AlertEvent {
            alert_id: alert_id.to_string(),
            status: if firing {
                AlertStatus::Firing
            } else {
                AlertStatus::Resolved
            },
            severity: if firing {
                Severity::Warning
            } else {
                Severity::Info
            },
            source: source.to_string(),
            alert_type: alert_type.to_string(),
            message,
            timestamp: Utc::now().timestamp(),
            fault_code: fault_code.to_string(),
            metric_value: value,
            related_alerts: Vec::new(),
            metadata,
        }
    }

    /// A rising series breaches the predictive band once the rate-projected
    /// next value crosses it.
    fn predicts_breach(&self, trend: TrendInfo, current: f64, band: f64) -> bool {
        trend.increasing
            && trend.run >= self.config.sustained
            && current * (1.0 + trend.change_rate) >= band
    }

    pub fn analyze_container(&self, id: &str) -> Vec<AlertEvent> {
        let history = self
            .store
            .history(MetricKind::Container, id, self.config.window);
        if history.len() < self.config.min_samples {
            return Vec::new();
        }

        let mut events = Vec::new();

        let cpu: Vec<f64> = history
            .iter()
            .filter_map(|s| match s {
                MetricSnapshot::Container(m) => Some(m.cpu_usage.total),
                _ => None,
            })
            .collect();
        if let Some(&current) = cpu.last() {
            let trend = classify(&cpu);
            let firing = self.predicts_breach(trend, current, self.config.cpu_predict_percent);
            if let Some(firing) = self.edge("TREND_CONTAINER_CPU", id, firing) {
                let prediction = format!(
                    "may reach {:.0}% within the next window",
                    self.config.cpu_predict_percent
                );
                events.push(self.trend_event(
                    "TREND_CONTAINER_CPU",
                    "cpu_trend",
                    id,
                    "TREND_CPU_INCREASE",
                    firing,
                    current,
                    trend,
                    &prediction,
                    if firing {
                        format!(
                            "container cpu usage rising steadily, now {current:.1}%, change rate {:.1}%",
                            trend.change_rate * 100.0
                        )
                    } else {
                        format!("container cpu usage trend settled at {current:.1}%")
                    },
                ));
            }
        }

        // Restart storm: an uptime drop between adjacent samples means the
        // container restarted in between.
        let uptimes: Vec<i64> = history
            .iter()
            .filter_map(|s| match s {
                MetricSnapshot::Container(m) => Some(m.uptime_secs),
                _ => None,
            })
            .collect();
        let restarts = uptimes.windows(2).filter(|w| w[1] < w[0]).count();
        let firing = restarts >= self.config.restart_limit;
        if let Some(firing) = self.edge("TREND_CONTAINER_RESTART", id, firing) {
            events.push(self.trend_event(
                "TREND_CONTAINER_RESTART",
                "restart_trend",
                id,
                "TREND_RESTART_INCREASE",
                firing,
                restarts as f64,
                TrendInfo {
                    increasing: firing,
                    ..TrendInfo::default()
                },
                "",
                if firing {
                    format!(
                        "container restarted {restarts} times within the last {} minutes",
                        self.config.window.num_minutes()
                    )
                } else {
                    "container restart rate back to normal".to_string()
                },
            ));
        }

        events
    }

    pub fn analyze_service(&self, id: &str) -> Vec<AlertEvent> {
        let history = self
            .store
            .history(MetricKind::Service, id, self.config.window);
        if history.len() < self.config.min_samples {
            return Vec::new();
        }

        let rates: Vec<f64> = history
            .iter()
            .filter_map(|s| match s {
                MetricSnapshot::Service(m) => Some(m.check_fail_percent()),
                _ => None,
            })
            .collect();
        let Some(&current) = rates.last() else {
            return Vec::new();
        };

        let trend = classify(&rates);
        let firing = trend.increasing
            && trend.run >= self.config.sustained
            && current > self.config.fail_rate_percent;

        let Some(firing) = self.edge("TREND_SERVICE_VALIDATION", id, firing) else {
            return Vec::new();
        };
        vec![self.trend_event(
            "TREND_SERVICE_VALIDATION",
            "validation_trend",
            id,
            "TREND_VALIDATION_FAILURE",
            firing,
            current,
            trend,
            "failure rate still climbing",
            if firing {
                format!(
                    "service validation failure rate rising, now {current:.1}%, change rate {:.1}%",
                    trend.change_rate * 100.0
                )
            } else {
                format!("service validation failure rate settled at {current:.1}%")
            },
        )]
    }

    pub fn analyze_node(&self, id: &str) -> Vec<AlertEvent> {
        let history = self.store.history(MetricKind::Node, id, self.config.window);
        if history.len() < self.config.min_samples {
            return Vec::new();
        }

        let mut events = Vec::new();

        let cpu: Vec<f64> = history
            .iter()
            .filter_map(|s| match s {
                MetricSnapshot::Node(m) => Some(m.cpu_usage.total),
                _ => None,
            })
            .collect();
        if let Some(&current) = cpu.last() {
            let trend = classify(&cpu);
            let firing = self.predicts_breach(trend, current, self.config.cpu_predict_percent);
            if let Some(firing) = self.edge("TREND_NODE_CPU", id, firing) {
                events.push(self.trend_event(
                    "TREND_NODE_CPU",
                    "cpu_trend",
                    id,
                    "TREND_CPU_INCREASE",
                    firing,
                    current,
                    trend,
                    "cpu usage projected to keep rising",
                    if firing {
                        format!(
                            "node cpu usage rising steadily, now {current:.1}%, change rate {:.1}%",
                            trend.change_rate * 100.0
                        )
                    } else {
                        format!("node cpu usage trend settled at {current:.1}%")
                    },
                ));
            }
        }

        let memory: Vec<f64> = history
            .iter()
            .filter_map(|s| match s {
                MetricSnapshot::Node(m) => Some(m.memory_used_percent()),
                _ => None,
            })
            .collect();
        if let Some(&current) = memory.last() {
            let trend = classify(&memory);
            let firing = self.predicts_breach(trend, current, self.config.memory_predict_percent);
            if let Some(firing) = self.edge("TREND_NODE_MEMORY", id, firing) {
                events.push(self.trend_event(
                    "TREND_NODE_MEMORY",
                    "memory_trend",
                    id,
                    "TREND_MEMORY_INCREASE",
                    firing,
                    current,
                    trend,
                    "memory usage projected to keep rising",
                    if firing {
                        format!(
                            "node memory usage rising steadily, now {current:.1}%, change rate {:.1}%",
                            trend.change_rate * 100.0
                        )
                    } else {
                        format!("node memory usage trend settled at {current:.1}%")
                    },
                ));
            }
        }

        events
    }
}
