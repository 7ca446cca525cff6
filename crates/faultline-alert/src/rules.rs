use faultline_common::metrics::{BusinessMetrics, BusinessPayload};
use faultline_common::types::Severity;
use serde::Deserialize;

/// In/out-of-band rule for one business-bus reading. The rule fires while
/// the reading is outside `[min, max]`.
#[derive(Debug, Clone, Deserialize)]
pub struct BandRule {
    pub alert_id: String,
    /// Component name as produced by `ComponentKind::name()`.
    pub component: String,
    /// Reading name, e.g. `battery_voltage` or `zone_temp_3`.
    pub field: String,
    pub min: f64,
    pub max: f64,
    pub severity: Severity,
    pub fault_code: String,
}

impl BandRule {
    /// Built-in rule table, used when the config does not override it.
    pub fn default_rules() -> Vec<BandRule> {
        vec![
            BandRule {
                alert_id: "BATTERY_VOLTAGE_ALERT".into(),
                component: "power".into(),
                field: "battery_voltage".into(),
                min: 21.0,
                max: 29.4,
                severity: Severity::Critical,
                fault_code: "POWER-VOLTAGE-001".into(),
            },
            BandRule {
                alert_id: "BUS_VOLTAGE_ALERT".into(),
                component: "power".into(),
                field: "bus_voltage".into(),
                min: 24.0,
                max: 28.0,
                severity: Severity::Critical,
                fault_code: "POWER-VOLTAGE-001".into(),
            },
            BandRule {
                alert_id: "CPU_BOARD_VOLTAGE_ALERT".into(),
                component: "power".into(),
                field: "cpu_board_voltage".into(),
                min: 3.1,
                max: 3.5,
                severity: Severity::Critical,
                fault_code: "POWER-VOLTAGE-001".into(),
            },
            BandRule {
                alert_id: "LOAD_CURRENT_ALERT".into(),
                component: "power".into(),
                field: "load_current".into(),
                min: 0.5,
                max: 5.0,
                severity: Severity::Warning,
                fault_code: "POWER-CURRENT-001".into(),
            },
            BandRule {
                alert_id: "BATTERY_TEMP_ALERT".into(),
                component: "thermal".into(),
                field: "battery_temp_1".into(),
                min: -10.0,
                max: 45.0,
                severity: Severity::Critical,
                fault_code: "THERMAL-TEMP-001".into(),
            },
            BandRule {
                alert_id: "PLATFORM_TEMP_ALERT".into(),
                component: "thermal".into(),
                field: "platform_temp".into(),
                min: -20.0,
                max: 60.0,
                severity: Severity::Warning,
                fault_code: "THERMAL-TEMP-001".into(),
            },
        ]
    }
}

/// Resolve a named reading from a decoded bus packet. `zone_temp_<n>` is
/// 1-based into the thermal zone array.
pub fn business_field(metrics: &BusinessMetrics, field: &str) -> Option<f64> {
    match &metrics.payload {
        BusinessPayload::Power(p) => match field {
            "supply_module_voltage" => Some(p.supply_module_voltage),
            "battery_voltage" => Some(p.battery_voltage),
            "bus_voltage" => Some(p.bus_voltage),
            "cpu_board_voltage" => Some(p.cpu_board_voltage),
            "reference_voltage" => Some(p.reference_voltage),
            "bracket_current" => Some(p.bracket_current),
            "load_current" => Some(p.load_current),
            _ => None,
        },
        BusinessPayload::Thermal(t) => {
            if let Some(index) = field.strip_prefix("zone_temp_") {
                let index: usize = index.parse().ok()?;
                return t.zone_temps.get(index.checked_sub(1)?).copied();
            }
            match field {
                "battery_temp_1" => Some(t.battery_temp_1),
                "battery_temp_2" => Some(t.battery_temp_2),
                "platform_temp" => Some(t.platform_temp),
                "battery_loop_temp" => Some(t.battery_loop_temp),
                "tank_loop_temp" => Some(t.tank_loop_temp),
                _ => None,
            }
        }
    }
}
