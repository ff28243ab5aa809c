use crate::error::Result;
use crate::model::{Absence, CoreUsage, CpuMetrics};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::Duration;
use sysinfo::System;

/// Processor usage, frequency and load averages via sysinfo.
pub struct CpuProvider {
    sys: System,
    timeout: Duration,
    use_procfs: bool,
}

impl CpuProvider {
    pub fn new(timeout: Duration, use_procfs: bool) -> Result<Self> {
        let mut sys = System::new();
        // First refresh establishes the usage baseline.
        sys.refresh_cpu();

        Ok(Self {
            sys,
            timeout,
            use_procfs,
        })
    }

    fn overall_usage(&self) -> f32 {
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|cpu| cpu.cpu_usage()).sum::<f32>() / cpus.len() as f32
    }

    #[cfg(all(target_os = "linux", feature = "linux_procfs"))]
    fn context_switches(&self) -> Option<u64> {
        if !self.use_procfs {
            return None;
        }
        procfs::KernelStats::new().ok().map(|stat| stat.ctxt)
    }

    #[cfg(not(all(target_os = "linux", feature = "linux_procfs")))]
    fn context_switches(&self) -> Option<u64> {
        None
    }

    #[cfg(unix)]
    fn load_averages() -> (f64, f64, f64) {
        let load = System::load_average();
        (load.one, load.five, load.fifteen)
    }

    #[cfg(not(unix))]
    fn load_averages() -> (f64, f64, f64) {
        (0.0, 0.0, 0.0)
    }
}

impl Provider for CpuProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Cpu
    }

    fn sample(&mut self) -> ProviderResult {
        self.sys.refresh_cpu();

        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return Err(Absence::Error("no processors enumerated".to_string()));
        }

        let per_core: Vec<CoreUsage> = cpus
            .iter()
            .enumerate()
            .map(|(id, cpu)| CoreUsage {
                id,
                usage_percent: cpu.cpu_usage(),
                frequency_mhz: cpu.frequency(),
            })
            .collect();

        let frequency_mhz = per_core.iter().map(|c| c.frequency_mhz).max().unwrap_or(0);
        let (load_avg_1, load_avg_5, load_avg_15) = Self::load_averages();

        Ok(Reading::Cpu(CpuMetrics {
            usage_percent: self.overall_usage(),
            frequency_mhz,
            logical_cores: cpus.len(),
            physical_cores: self.sys.physical_core_count(),
            load_avg_1,
            load_avg_5,
            load_avg_15,
            context_switches: self.context_switches(),
            per_core,
        }))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
