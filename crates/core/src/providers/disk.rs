use crate::error::Result;
use crate::model::{DeviceIo, DiskActivity};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use sysinfo::Disks;

/// Raw per-device counters at one point in time.
#[derive(Debug, Clone, Copy)]
struct DiskCounters {
    read_bytes: u64,
    write_bytes: u64,
    reads: u64,
    writes: u64,
    busy_ms: u64,
}

/// Per-device storage throughput. Counter deltas come from procfs
/// diskstats on Linux; capacity comes from sysinfo mounted disks.
pub struct DiskProvider {
    disks: Disks,
    previous: HashMap<String, DiskCounters>,
    previous_at: Option<Instant>,
    timeout: Duration,
    use_procfs: bool,
}

impl DiskProvider {
    pub fn new(timeout: Duration, use_procfs: bool) -> Result<Self> {
        let mut provider = Self {
            disks: Disks::new_with_refreshed_list(),
            previous: HashMap::new(),
            previous_at: None,
            timeout,
            use_procfs,
        };

        // Baseline so the first real sample yields deltas, not totals.
        provider.previous = provider.read_counters();
        provider.previous_at = Some(Instant::now());

        Ok(provider)
    }

    #[cfg(all(target_os = "linux", feature = "linux_procfs"))]
    fn read_counters(&self) -> HashMap<String, DiskCounters> {
        let mut counters = HashMap::new();
        if !self.use_procfs {
            return counters;
        }
        if let Ok(diskstats) = procfs::diskstats() {
            for stat in diskstats {
                counters.insert(
                    stat.name.clone(),
                    DiskCounters {
                        // 512-byte sectors per the kernel's fixed unit.
                        read_bytes: stat.sectors_read * 512,
                        write_bytes: stat.sectors_written * 512,
                        reads: stat.reads,
                        writes: stat.writes,
                        busy_ms: stat.time_in_progress,
                    },
                );
            }
        }
        counters
    }

    #[cfg(not(all(target_os = "linux", feature = "linux_procfs")))]
    fn read_counters(&self) -> HashMap<String, DiskCounters> {
        HashMap::new()
    }

    /// Capacity and mount point per device name, stripped of "/dev/".
    fn space_by_device(&self) -> HashMap<String, (u64, u64, String)> {
        let mut space = HashMap::new();
        for disk in &self.disks {
            let name = disk.name().to_string_lossy();
            let device = name.strip_prefix("/dev/").unwrap_or(&name).to_string();
            space.insert(
                device,
                (
                    disk.total_space(),
                    disk.available_space(),
                    disk.mount_point().to_string_lossy().to_string(),
                ),
            );
        }
        space
    }
}

impl Provider for DiskProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Disk
    }

    fn sample(&mut self) -> ProviderResult {
        self.disks.refresh();

        let now = Instant::now();
        let counters = self.read_counters();
        let elapsed = self
            .previous_at
            .map(|at| now.duration_since(at).as_secs_f64())
            .unwrap_or(0.0)
            .max(1e-6);
        let space = self.space_by_device();

        let mut devices = Vec::new();

        if counters.is_empty() {
            // No counter source: expose capacity rows with zero rates.
            for (device, (total_space, available_space, mount_point)) in &space {
                let mut row = DeviceIo::idle(device);
                row.total_space = *total_space;
                row.available_space = *available_space;
                row.mount_point = Some(mount_point.clone());
                devices.push(row);
            }
        } else {
            for (device, current) in &counters {
                let previous = self.previous.get(device);
                let (read_rate, write_rate, reads_rate, writes_rate, util) = match previous {
                    Some(prev) => {
                        let busy_delta = current.busy_ms.saturating_sub(prev.busy_ms) as f64;
                        (
                            current.read_bytes.saturating_sub(prev.read_bytes) as f64 / elapsed,
                            current.write_bytes.saturating_sub(prev.write_bytes) as f64 / elapsed,
                            current.reads.saturating_sub(prev.reads) as f64 / elapsed,
                            current.writes.saturating_sub(prev.writes) as f64 / elapsed,
                            (busy_delta / (elapsed * 1000.0) * 100.0).min(100.0) as f32,
                        )
                    }
                    None => (0.0, 0.0, 0.0, 0.0, 0.0),
                };

                let (total_space, available_space, mount_point) = space
                    .get(device)
                    .map(|(t, a, m)| (*t, *a, Some(m.clone())))
                    .unwrap_or((0, 0, None));

                devices.push(DeviceIo {
                    name: device.clone(),
                    read_bytes_per_sec: read_rate,
                    write_bytes_per_sec: write_rate,
                    reads_per_sec: reads_rate,
                    writes_per_sec: writes_rate,
                    utilization_percent: util,
                    total_space,
                    available_space,
                    mount_point,
                });
            }
        }

        devices.sort_by(|a, b| a.name.cmp(&b.name));
        let total_read_bytes_per_sec = devices.iter().map(|d| d.read_bytes_per_sec).sum();
        let total_write_bytes_per_sec = devices.iter().map(|d| d.write_bytes_per_sec).sum();

        self.previous = counters;
        self.previous_at = Some(now);

        Ok(Reading::Disk(DiskActivity {
            devices,
            total_read_bytes_per_sec,
            total_write_bytes_per_sec,
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
    fn test_disk_provider_samples() {
        let mut provider = DiskProvider::new(Duration::from_millis(900), true).unwrap();
        match provider.sample().unwrap() {
            Reading::Disk(disk) => {
                // Rates are non-negative regardless of counter source.
                for device in &disk.devices {
                    assert!(device.read_bytes_per_sec >= 0.0);
                    assert!(device.write_bytes_per_sec >= 0.0);
                    assert!(device.utilization_percent >= 0.0);
                    assert!(device.utilization_percent <= 100.0);
                }
            }
            other => panic!("unexpected reading: {:?}", other.category()),
        }
    }
}
