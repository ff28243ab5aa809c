use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Why a metric category carries no reading for a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Absence {
    /// The provider did not reply within its deadline.
    Timeout,
    /// The provider returned (or panicked with) an error.
    Error(String),
    /// No strategy for this category works on this host.
    NoProvider,
    /// The sampler has not asked this provider yet.
    NotYetSampled,
}

impl std::fmt::Display for Absence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Error(msg) => write!(f, "error: {}", msg),
            Self::NoProvider => write!(f, "no provider available"),
            Self::NotYetSampled => write!(f, "not yet sampled"),
        }
    }
}

/// A category reading or an explicit, typed absence.
///
/// Absence is a first-class variant so degraded categories serialize as
/// `{"status": "unavailable", ...}` rather than a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Reported<T> {
    Ready(T),
    Unavailable(Absence),
}

impl<T> Reported<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn absence(&self) -> Option<&Absence> {
        match self {
            Self::Ready(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

impl<T> From<Result<T, Absence>> for Reported<T> {
    fn from(result: Result<T, Absence>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(reason) => Self::Unavailable(reason),
        }
    }
}

/// Per-core processor usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreUsage {
    pub id: usize,
    pub usage_percent: f32,
    pub frequency_mhz: u64,
}

/// Processor metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage_percent: f32,
    pub frequency_mhz: u64,
    pub logical_cores: usize,
    pub physical_cores: Option<usize>,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
    pub context_switches: Option<u64>,
    pub per_core: Vec<CoreUsage>,
}

/// Memory and swap metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub free: u64,
    pub buffers: u64,
    pub cached: u64,
    pub percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
    pub swap_free: u64,
    pub swap_percent: f32,
}

/// Per-device storage throughput and capacity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIo {
    pub name: String,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub reads_per_sec: f64,
    pub writes_per_sec: f64,
    pub utilization_percent: f32,
    pub total_space: u64,
    pub available_space: u64,
    pub mount_point: Option<String>,
}

impl DeviceIo {
    /// All-zero reading for a registered device that reported nothing
    /// this tick.
    pub fn idle(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_bytes_per_sec: 0.0,
            write_bytes_per_sec: 0.0,
            reads_per_sec: 0.0,
            writes_per_sec: 0.0,
            utilization_percent: 0.0,
            total_space: 0,
            available_space: 0,
            mount_point: None,
        }
    }
}

/// Storage category reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskActivity {
    pub devices: Vec<DeviceIo>,
    pub total_read_bytes_per_sec: f64,
    pub total_write_bytes_per_sec: f64,
}

/// Per-interface network throughput
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceIo {
    pub name: String,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Network category reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkActivity {
    pub interfaces: Vec<InterfaceIo>,
    pub total_rx_bytes_per_sec: f64,
    pub total_tx_bytes_per_sec: f64,
}

/// One discrete accelerator's stats
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuStats {
    pub name: String,
    pub vendor: String,
    pub memory_total_bytes: u64,
    pub memory_used_bytes: u64,
    pub utilization_percent: f32,
    pub temperature_celsius: f32,
    pub graphics_clock_mhz: Option<u32>,
    pub memory_clock_mhz: Option<u32>,
}

impl GpuStats {
    /// Zero-valued stats for a registered accelerator that reported
    /// nothing this tick.
    pub fn idle(name: &str) -> Self {
        Self {
            name: name.to_string(),
            vendor: "Unknown".to_string(),
            memory_total_bytes: 0,
            memory_used_bytes: 0,
            utilization_percent: 0.0,
            temperature_celsius: 0.0,
            graphics_clock_mhz: None,
            memory_clock_mhz: None,
        }
    }
}

/// One PCIe device's negotiated link state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcieLink {
    /// Bus address, e.g. "0000:01:00.0".
    pub address: String,
    pub vendor_id: Option<String>,
    pub device_id: Option<String>,
    pub link_speed_gtps: Option<f64>,
    pub link_width: Option<u32>,
    pub max_link_speed_gtps: Option<f64>,
    pub max_link_width: Option<u32>,
}

/// PCIe category reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcieTopology {
    pub links: Vec<PcieLink>,
}

/// One temperature sensor reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub source: String,
    pub label: String,
    pub celsius: f32,
    pub critical: Option<f32>,
}

/// One fan tachometer reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanReading {
    pub source: String,
    pub label: String,
    pub rpm: u32,
}

/// One power draw reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerReading {
    pub source: String,
    pub watts: f64,
}

/// Battery charge state, when a battery exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryStatus {
    pub percent: f32,
    pub on_ac: bool,
    pub state: String,
}

/// Temperature/fan/power sensor groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReadings {
    pub temperatures: Vec<TemperatureReading>,
    pub fans: Vec<FanReading>,
    pub power: Vec<PowerReading>,
    pub battery: Option<BatteryStatus>,
}

/// One row of the process table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRow {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_rss: u64,
    pub state: String,
}

/// Process census: counts plus the heaviest entries by CPU and memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTable {
    pub total: usize,
    pub running: usize,
    pub top_cpu: Vec<ProcessRow>,
    pub top_memory: Vec<ProcessRow>,
}

/// Static system facts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFacts {
    pub hostname: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub uptime: Duration,
    pub boot_time: SystemTime,
}

/// Coarse telemetry access level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Full,
    Good,
    Partial,
    Limited,
    ContainerGood,
    ContainerLimited,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Good => "good",
            Self::Partial => "partial",
            Self::Limited => "limited",
            Self::ContainerGood => "container_good",
            Self::ContainerLimited => "container_limited",
        }
    }
}

/// Cached classification of how much telemetry is accessible
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionStatus {
    pub level: PermissionLevel,
    pub access_percentage: u8,
    pub has_root: bool,
    pub is_container: bool,
    pub accessible_paths: BTreeMap<String, bool>,
    pub warnings: Vec<String>,
}

impl PermissionStatus {
    /// Placeholder used between engine start and the first probe result.
    pub fn pending() -> Self {
        Self {
            level: PermissionLevel::Limited,
            access_percentage: 0,
            has_root: false,
            is_container: false,
            accessible_paths: BTreeMap::new(),
            warnings: vec!["determining system permissions".to_string()],
        }
    }
}

/// One immutable, timestamped aggregate reading across all categories.
///
/// Built once per tick by the sampler and never mutated after publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: SystemTime,
    pub sequence: u64,
    pub cpu: Reported<CpuMetrics>,
    pub memory: Reported<MemoryMetrics>,
    pub disks: Reported<DiskActivity>,
    pub networks: Reported<NetworkActivity>,
    pub gpus: Reported<Vec<GpuStats>>,
    pub pcie: Reported<PcieTopology>,
    pub sensors: Reported<SensorReadings>,
    pub processes: Reported<ProcessTable>,
    pub system: Reported<SystemFacts>,
    pub permissions: PermissionStatus,
}
