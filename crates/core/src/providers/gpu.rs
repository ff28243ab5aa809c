use crate::model::{Absence, GpuStats};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::process::Command;
use std::sync::mpsc;
use std::time::Duration;

use nvml_wrapper::enum_wrappers::device::{Clock, TemperatureSensor};
use nvml_wrapper::Nvml;

/// One interchangeable way of acquiring accelerator stats.
///
/// Strategies are tried in order; the first `Ok` wins. An `Ok` with an
/// empty list means the strategy works and found no devices, which is a
/// final answer, not a reason to fall through.
pub trait GpuStrategy: Send {
    fn name(&self) -> &'static str;

    fn acquire(&mut self) -> Result<Vec<GpuStats>, Absence>;
}

/// Primary strategy: the `nvidia-smi` command-line utility.
pub struct NvidiaSmiStrategy {
    command_timeout: Duration,
}

impl NvidiaSmiStrategy {
    const QUERY: &'static str =
        "--query-gpu=name,utilization.gpu,memory.total,memory.used,temperature.gpu,clocks.current.graphics,clocks.current.memory";

    pub fn new(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    fn run_query(timeout: Duration) -> Result<String, Absence> {
        // The command runs on its own thread so a wedged driver cannot
        // hold the provider worker past its deadline.
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("nvidia-smi".to_string())
            .spawn(move || {
                let output = Command::new("nvidia-smi")
                    .arg(Self::QUERY)
                    .arg("--format=csv,noheader,nounits")
                    .output();
                tx.send(output).ok();
            })
            .map_err(|e| Absence::Error(format!("failed to spawn nvidia-smi thread: {}", e)))?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(Ok(_)) => Err(Absence::NoProvider),
            Ok(Err(_)) => Err(Absence::NoProvider),
            Err(_) => Err(Absence::Timeout),
        }
    }

    fn parse_field(field: &str) -> Option<f64> {
        match field.trim() {
            "[Not Supported]" | "[N/A]" | "" => None,
            value => value.parse().ok(),
        }
    }

    fn parse(stdout: &str) -> Vec<GpuStats> {
        let mut stats = Vec::new();
        for line in stdout.lines() {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 5 {
                continue;
            }
            let mib = 1024u64 * 1024;
            stats.push(GpuStats {
                name: parts[0].to_string(),
                vendor: "NVIDIA".to_string(),
                utilization_percent: Self::parse_field(parts[1]).unwrap_or(0.0) as f32,
                memory_total_bytes: Self::parse_field(parts[2]).unwrap_or(0.0) as u64 * mib,
                memory_used_bytes: Self::parse_field(parts[3]).unwrap_or(0.0) as u64 * mib,
                temperature_celsius: Self::parse_field(parts[4]).unwrap_or(0.0) as f32,
                graphics_clock_mhz: parts
                    .get(5)
                    .and_then(|f| Self::parse_field(f))
                    .map(|v| v as u32),
                memory_clock_mhz: parts
                    .get(6)
                    .and_then(|f| Self::parse_field(f))
                    .map(|v| v as u32),
            });
        }
        stats
    }
}

impl GpuStrategy for NvidiaSmiStrategy {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn acquire(&mut self) -> Result<Vec<GpuStats>, Absence> {
        let stdout = Self::run_query(self.command_timeout)?;
        let stats = Self::parse(&stdout);
        if stats.is_empty() {
            // Tool present but reported nothing parseable.
            return Err(Absence::NoProvider);
        }
        Ok(stats)
    }
}

/// Secondary strategy: the NVML management library binding.
pub struct NvmlStrategy {
    nvml: Option<Nvml>,
    init_attempted: bool,
}

impl NvmlStrategy {
    pub fn new() -> Self {
        Self {
            nvml: None,
            init_attempted: false,
        }
    }

    fn handle(&mut self) -> Option<&Nvml> {
        if !self.init_attempted {
            self.init_attempted = true;
            match Nvml::init() {
                Ok(nvml) => self.nvml = Some(nvml),
                Err(e) => tracing::debug!("NVML unavailable: {}", e),
            }
        }
        self.nvml.as_ref()
    }
}

impl Default for NvmlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuStrategy for NvmlStrategy {
    fn name(&self) -> &'static str {
        "nvml"
    }

    fn acquire(&mut self) -> Result<Vec<GpuStats>, Absence> {
        let Some(nvml) = self.handle() else {
            return Err(Absence::NoProvider);
        };

        let count = nvml
            .device_count()
            .map_err(|e| Absence::Error(format!("device_count: {}", e)))?;

        let mut stats = Vec::with_capacity(count as usize);
        for index in 0..count {
            let device = nvml
                .device_by_index(index)
                .map_err(|e| Absence::Error(format!("device {}: {}", index, e)))?;

            let memory = device.memory_info().ok();
            let utilization = device.utilization_rates().ok();

            stats.push(GpuStats {
                name: device.name().unwrap_or_else(|_| "NVIDIA GPU".to_string()),
                vendor: "NVIDIA".to_string(),
                memory_total_bytes: memory.as_ref().map(|m| m.total).unwrap_or(0),
                memory_used_bytes: memory.as_ref().map(|m| m.used).unwrap_or(0),
                utilization_percent: utilization.map(|u| u.gpu as f32).unwrap_or(0.0),
                temperature_celsius: device
                    .temperature(TemperatureSensor::Gpu)
                    .map(|t| t as f32)
                    .unwrap_or(0.0),
                graphics_clock_mhz: device.clock_info(Clock::Graphics).ok(),
                memory_clock_mhz: device.clock_info(Clock::Memory).ok(),
            });
        }

        Ok(stats)
    }
}

/// Accelerator provider composed of an ordered strategy chain.
///
/// All strategies unavailable reports `Absence::NoProvider`; downstream
/// treats that as zero accelerators present, never as a failed tick.
pub struct GpuProvider {
    strategies: Vec<Box<dyn GpuStrategy>>,
    timeout: Duration,
}

impl GpuProvider {
    pub fn new(strategies: Vec<Box<dyn GpuStrategy>>, timeout: Duration) -> Self {
        Self { strategies, timeout }
    }

    /// The production chain: nvidia-smi first (no linkage needed, most
    /// reliable when present), NVML as the library-backed fallback.
    pub fn with_default_strategies(timeout: Duration) -> Self {
        let command_timeout = timeout.min(Duration::from_secs(5));
        Self::new(
            vec![
                Box::new(NvidiaSmiStrategy::new(command_timeout)),
                Box::new(NvmlStrategy::new()),
            ],
            timeout,
        )
    }
}

impl Provider for GpuProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Gpu
    }

    fn sample(&mut self) -> ProviderResult {
        for strategy in &mut self.strategies {
            match strategy.acquire() {
                Ok(stats) => return Ok(Reading::Gpu(stats)),
                Err(reason) => {
                    tracing::trace!(strategy = strategy.name(), %reason, "gpu strategy unavailable");
                }
            }
        }
        Err(Absence::NoProvider)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
