use crate::error::Result;
use crate::model::MemoryMetrics;
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::Duration;
use sysinfo::System;

/// Memory and swap usage via sysinfo, with buffers/cached detail from
/// procfs where available.
pub struct MemoryProvider {
    sys: System,
    timeout: Duration,
    use_procfs: bool,
}

impl MemoryProvider {
    pub fn new(timeout: Duration, use_procfs: bool) -> Result<Self> {
        Ok(Self {
            sys: System::new(),
            timeout,
            use_procfs,
        })
    }

    #[cfg(all(target_os = "linux", feature = "linux_procfs"))]
    fn buffers_cached(&self) -> (u64, u64) {
        if self.use_procfs {
            if let Ok(meminfo) = procfs::Meminfo::new() {
                return (meminfo.buffers, meminfo.cached);
            }
        }
        self.estimate_buffers_cached()
    }

    #[cfg(not(all(target_os = "linux", feature = "linux_procfs")))]
    fn buffers_cached(&self) -> (u64, u64) {
        self.estimate_buffers_cached()
    }

    fn estimate_buffers_cached(&self) -> (u64, u64) {
        // Without procfs the split is not exposed; approximate cached as
        // the gap between available and free.
        let free = self.sys.free_memory();
        let available = self.sys.available_memory();
        let cached = available.saturating_sub(free);
        (0, cached)
    }
}

impl Provider for MemoryProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Memory
    }

    fn sample(&mut self) -> ProviderResult {
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        let swap_total = self.sys.total_swap();
        let swap_used = self.sys.used_swap();
        let (buffers, cached) = self.buffers_cached();

        let percent = if total > 0 {
            used as f32 / total as f32 * 100.0
        } else {
            0.0
        };
        let swap_percent = if swap_total > 0 {
            swap_used as f32 / swap_total as f32 * 100.0
        } else {
            0.0
        };

        Ok(Reading::Memory(MemoryMetrics {
            total,
            used,
            available: self.sys.available_memory(),
            free: self.sys.free_memory(),
            buffers,
            cached,
            percent,
            swap_total,
            swap_used,
            swap_free: self.sys.free_swap(),
            swap_percent,
        }))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_provider_samples() {
        let mut provider = MemoryProvider::new(Duration::from_millis(900), true).unwrap();
        match provider.sample().unwrap() {
            Reading::Memory(memory) => {
                assert!(memory.total > 0);
                assert!(memory.percent >= 0.0 && memory.percent <= 100.0);
            }
            other => panic!("unexpected reading: {:?}", other.category()),
        }
    }
}
