use serde::{Deserialize, Serialize};

/// Category of a metric snapshot, used (with the target id) as the key of
/// the latest-value map and the history ring buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Node,
    Container,
    Service,
    Business,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetricKind::Node => "node",
            MetricKind::Container => "container",
            MetricKind::Service => "service",
            MetricKind::Business => "business",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    pub total: f64,
    #[serde(default)]
    pub cores: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeNetInfo {
    pub network_name: String,
    pub up_net: f64,
    pub down_net: f64,
}

/// Snapshot of one cluster node as reported by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub id: String,
    pub status: String,
    pub memory_total: i64,
    pub memory_free: i64,
    pub disk_total: f64,
    pub disk_free: f64,
    pub cpu_usage: CpuUsage,
    pub process_count: i64,
    pub container_total: i64,
    pub container_running: i64,
    #[serde(default)]
    pub net: Vec<NodeNetInfo>,
    pub timestamp: i64,
}

impl NodeMetrics {
    pub fn memory_used_percent(&self) -> f64 {
        if self.memory_total <= 0 {
            return 0.0;
        }
        (self.memory_total - self.memory_free) as f64 / self.memory_total as f64 * 100.0
    }

    pub fn disk_used_percent(&self) -> f64 {
        if self.disk_total <= 0.0 {
            return 0.0;
        }
        (self.disk_total - self.disk_free) / self.disk_total * 100.0
    }
}

/// Snapshot of one container instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerMetrics {
    pub id: String,
    pub status: String,
    pub uptime_secs: i64,
    pub deploy_status: String,
    #[serde(default)]
    pub failed_message: Option<String>,
    pub restart_count: i64,
    pub deploy_num: i64,
    pub cpu_usage: CpuUsage,
    pub memory_limit: i64,
    pub memory_usage: i64,
    pub size_usage: i64,
    pub size_limit: i64,
    /// Owning service, when known. Propagated into alert metadata so the
    /// diagnosis context can carry it through to recovery.
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    pub timestamp: i64,
}

impl ContainerMetrics {
    pub fn memory_used_percent(&self) -> f64 {
        if self.memory_limit <= 0 {
            return 0.0;
        }
        self.memory_usage as f64 / self.memory_limit as f64 * 100.0
    }

    pub fn disk_used_percent(&self) -> f64 {
        if self.size_limit <= 0 {
            return 0.0;
        }
        self.size_usage as f64 / self.size_limit as f64 * 100.0
    }
}

/// Snapshot of one service as seen by the orchestrator scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub id: String,
    pub status: String,
    pub healthy: bool,
    pub factor: i64,
    #[serde(default)]
    pub policy: String,
    pub instance_online: i64,
    pub instance_active: i64,
    pub check_success: i64,
    pub check_fail: i64,
    pub timestamp: i64,
}

impl ServiceMetrics {
    /// Validation failure rate in percent; 0 when no checks ran yet.
    pub fn check_fail_percent(&self) -> f64 {
        let total = self.check_success + self.check_fail;
        if total <= 0 {
            return 0.0;
        }
        self.check_fail as f64 / total as f64 * 100.0
    }
}

/// Business-bus component, identified by the first byte of a bus packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Power,
    Thermal,
}

impl ComponentKind {
    pub const fn code(self) -> u8 {
        match self {
            ComponentKind::Power => 0x03,
            ComponentKind::Thermal => 0x06,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x03 => Some(ComponentKind::Power),
            0x06 => Some(ComponentKind::Thermal),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ComponentKind::Power => "power",
            ComponentKind::Thermal => "thermal",
        }
    }
}

/// Power-supply component readings (volts / amperes).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerReadings {
    pub supply_module_voltage: f64,
    pub battery_voltage: f64,
    pub bus_voltage: f64,
    pub cpu_board_voltage: f64,
    pub reference_voltage: f64,
    pub bracket_current: f64,
    pub load_current: f64,
}

/// Thermal-control component readings (degrees Celsius + heater switches).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThermalReadings {
    pub zone_temps: Vec<f64>,
    pub battery_temp_1: f64,
    pub battery_temp_2: f64,
    pub platform_temp: f64,
    pub battery_loop_temp: f64,
    pub tank_loop_temp: f64,
    pub platform_heater_on: bool,
    pub battery_heater_on: bool,
    pub tank_heater_on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusinessPayload {
    Power(PowerReadings),
    Thermal(ThermalReadings),
}

/// Decoded business-bus packet for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessMetrics {
    pub component: ComponentKind,
    pub timestamp: i64,
    pub payload: BusinessPayload,
}

/// Tagged metric snapshot. The latest-value map is keyed by
/// (`kind()`, `id()`), so no downcasting is needed at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricSnapshot {
    Node(NodeMetrics),
    Container(ContainerMetrics),
    Service(ServiceMetrics),
    Business(BusinessMetrics),
}

impl MetricSnapshot {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSnapshot::Node(_) => MetricKind::Node,
            MetricSnapshot::Container(_) => MetricKind::Container,
            MetricSnapshot::Service(_) => MetricKind::Service,
            MetricSnapshot::Business(_) => MetricKind::Business,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            MetricSnapshot::Node(m) => &m.id,
            MetricSnapshot::Container(m) => &m.id,
            MetricSnapshot::Service(m) => &m.id,
            MetricSnapshot::Business(m) => m.component.name(),
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            MetricSnapshot::Node(m) => m.timestamp,
            MetricSnapshot::Container(m) => m.timestamp,
            MetricSnapshot::Service(m) => m.timestamp,
            MetricSnapshot::Business(m) => m.timestamp,
        }
    }
}
