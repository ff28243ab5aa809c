use crate::error::Result;
use crate::model::{ProcessRow, ProcessTable};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::Duration;
use sysinfo::System;

/// Rows kept per top-list.
const TOP_N: usize = 15;

/// Process census via sysinfo. Enumeration is the most expensive
/// provider, so the sampler throttles it to `min_interval` and re-uses
/// the last reading in between.
pub struct ProcessProvider {
    sys: System,
    timeout: Duration,
    min_interval: Duration,
}

impl ProcessProvider {
    pub fn new(timeout: Duration, min_interval: Duration) -> Result<Self> {
        let mut sys = System::new_all();
        sys.refresh_processes();

        Ok(Self {
            sys,
            timeout,
            min_interval,
        })
    }

    fn row(process: &sysinfo::Process, total_memory: u64) -> ProcessRow {
        let memory_percent = if total_memory > 0 {
            process.memory() as f32 / total_memory as f32 * 100.0
        } else {
            0.0
        };

        ProcessRow {
            pid: process.pid().as_u32(),
            name: process.name().to_string(),
            user: process
                .user_id()
                .map(|uid| uid.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            cpu_percent: process.cpu_usage(),
            memory_percent,
            memory_rss: process.memory(),
            state: format!("{:?}", process.status()),
        }
    }
}

impl Provider for ProcessProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Processes
    }

    fn sample(&mut self) -> ProviderResult {
        self.sys.refresh_processes();

        let total_memory = self.sys.total_memory();
        let mut rows: Vec<ProcessRow> = self
            .sys
            .processes()
            .values()
            .map(|process| Self::row(process, total_memory))
            .collect();

        let total = rows.len();
        let running = self
            .sys
            .processes()
            .values()
            .filter(|p| matches!(p.status(), sysinfo::ProcessStatus::Run))
            .count();

        rows.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let top_cpu: Vec<ProcessRow> = rows.iter().take(TOP_N).cloned().collect();

        rows.sort_by(|a, b| b.memory_rss.cmp(&a.memory_rss));
        let top_memory: Vec<ProcessRow> = rows.into_iter().take(TOP_N).collect();

        Ok(Reading::Processes(ProcessTable {
            total,
            running,
            top_cpu,
            top_memory,
        }))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_provider_samples() {
        let mut provider =
            ProcessProvider::new(Duration::from_millis(900), Duration::from_millis(2000)).unwrap();
        match provider.sample().unwrap() {
            Reading::Processes(table) => {
                assert!(table.total > 0);
                assert!(table.top_cpu.len() <= TOP_N);
                assert!(table.top_memory.len() <= TOP_N);
                assert!(table.running <= table.total);
            }
            other => panic!("unexpected reading: {:?}", other.category()),
        }
    }

    #[test]
    fn test_process_provider_declares_throttle() {
        let provider =
            ProcessProvider::new(Duration::from_millis(900), Duration::from_millis(2000)).unwrap();
        assert_eq!(provider.min_interval(), Duration::from_millis(2000));
    }
}
