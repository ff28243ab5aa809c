pub mod cpu;
pub mod disk;
pub mod gpu;
pub mod memory;
pub mod network;
pub mod pcie;
pub mod process;
pub mod sensors;
pub mod system;

pub use cpu::CpuProvider;
pub use disk::DiskProvider;
pub use gpu::{GpuProvider, GpuStrategy, NvidiaSmiStrategy, NvmlStrategy};
pub use memory::MemoryProvider;
pub use network::NetworkProvider;
pub use pcie::PcieProvider;
pub use process::ProcessProvider;
pub use sensors::SensorProvider;
pub use system::SystemProvider;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::model::{
    Absence, CpuMetrics, DiskActivity, GpuStats, MemoryMetrics, NetworkActivity, PcieTopology,
    ProcessTable, SensorReadings, SystemFacts,
};
use std::time::Duration;

/// Metric category a provider is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCategory {
    Cpu,
    Memory,
    Disk,
    Network,
    Gpu,
    Pcie,
    Sensors,
    Processes,
    System,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Gpu => "gpu",
            Self::Pcie => "pcie",
            Self::Sensors => "sensors",
            Self::Processes => "processes",
            Self::System => "system",
        }
    }
}

/// One category's reading, tagged so the sampler can route it without
/// downcasting.
#[derive(Debug, Clone)]
pub enum Reading {
    Cpu(CpuMetrics),
    Memory(MemoryMetrics),
    Disk(DiskActivity),
    Network(NetworkActivity),
    Gpu(Vec<GpuStats>),
    Pcie(PcieTopology),
    Sensors(SensorReadings),
    Processes(ProcessTable),
    System(SystemFacts),
}

impl Reading {
    pub fn category(&self) -> ProviderCategory {
        match self {
            Self::Cpu(_) => ProviderCategory::Cpu,
            Self::Memory(_) => ProviderCategory::Memory,
            Self::Disk(_) => ProviderCategory::Disk,
            Self::Network(_) => ProviderCategory::Network,
            Self::Gpu(_) => ProviderCategory::Gpu,
            Self::Pcie(_) => ProviderCategory::Pcie,
            Self::Sensors(_) => ProviderCategory::Sensors,
            Self::Processes(_) => ProviderCategory::Processes,
            Self::System(_) => ProviderCategory::System,
        }
    }
}

/// A reading or a typed absence, never a silent default.
pub type ProviderResult = std::result::Result<Reading, Absence>;

/// A pluggable source of one metric category's reading.
///
/// Providers run on dedicated worker threads owned by the sampler, so
/// `sample` may block up to `timeout`; a slower reply is recorded as a
/// timeout for that tick and dropped when it eventually arrives.
pub trait Provider: Send {
    fn category(&self) -> ProviderCategory;

    fn sample(&mut self) -> ProviderResult;

    /// Reply deadline the sampler enforces for this provider.
    fn timeout(&self) -> Duration {
        Duration::from_millis(900)
    }

    /// Minimum spacing between samples. Zero means every tick.
    fn min_interval(&self) -> Duration {
        Duration::ZERO
    }
}

/// The default provider set for the current host.
pub fn default_providers(config: &EngineConfig) -> Result<Vec<Box<dyn Provider>>> {
    let timeout = config.provider_timeout();
    Ok(vec![
        Box::new(CpuProvider::new(timeout, config.use_procfs)?),
        Box::new(MemoryProvider::new(timeout, config.use_procfs)?),
        Box::new(DiskProvider::new(timeout, config.use_procfs)?),
        Box::new(NetworkProvider::new(timeout)?),
        Box::new(GpuProvider::with_default_strategies(timeout)),
        Box::new(PcieProvider::new(timeout)?),
        Box::new(SensorProvider::new(timeout)?),
        Box::new(ProcessProvider::new(timeout, config.process_min_interval())?),
        Box::new(SystemProvider::new(timeout)?),
    ])
}
