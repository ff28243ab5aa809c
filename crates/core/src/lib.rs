//! Host metrics acquisition engine.
//!
//! A background sampler polls per-category providers (CPU, memory,
//! storage, network, accelerators, sensors, processes, system facts) on
//! a fixed tick, assembles complete snapshots where every category is
//! either a reading or an explicit absence, and publishes them to a
//! lock-light store plus rolling per-metric history windows. Consumers
//! pull; acquisition never blocks a read.

pub mod config;
pub mod error;
pub mod history;
pub mod identity;
pub mod model;
pub mod monitor;
pub mod permissions;
pub mod providers;
pub mod sampler;
pub mod store;

pub use config::{CliOverrides, EngineConfig};
pub use error::{EngineError, Result};
pub use history::{HistoryAggregator, HistorySeries, HistoryWindow};
pub use identity::{DeviceClass, DeviceRegistry};
pub use model::{
    Absence, CpuMetrics, DeviceIo, DiskActivity, GpuStats, MemoryMetrics, NetworkActivity,
    PcieLink, PcieTopology, PermissionLevel, PermissionStatus, ProcessTable, Reported,
    SensorReadings, Snapshot, SystemFacts,
};
pub use monitor::{Monitor, WireDocument};
pub use permissions::{PermissionCache, PermissionProbe};
pub use providers::{Provider, ProviderCategory, ProviderResult, Reading};
pub use sampler::Diagnostics;
pub use store::SnapshotStore;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> EngineConfig {
        EngineConfig {
            tick_ms: 50,
            ..EngineConfig::default()
        }
    }

    fn cpu_metrics(usage: f32) -> CpuMetrics {
        CpuMetrics {
            usage_percent: usage,
            frequency_mhz: 2400,
            logical_cores: 4,
            physical_cores: Some(2),
            load_avg_1: 0.5,
            load_avg_5: 0.4,
            load_avg_15: 0.3,
            context_switches: None,
            per_core: Vec::new(),
        }
    }

    struct FixedCpu {
        usage: f32,
        calls: Arc<AtomicUsize>,
        min_interval: Duration,
        delay: Duration,
    }

    impl FixedCpu {
        fn new(usage: f32) -> Self {
            Self {
                usage,
                calls: Arc::new(AtomicUsize::new(0)),
                min_interval: Duration::ZERO,
                delay: Duration::ZERO,
            }
        }
    }

    impl Provider for FixedCpu {
        fn category(&self) -> ProviderCategory {
            ProviderCategory::Cpu
        }

        fn sample(&mut self) -> ProviderResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            Ok(Reading::Cpu(cpu_metrics(self.usage)))
        }

        fn min_interval(&self) -> Duration {
            self.min_interval
        }
    }

    struct ScriptedDisk {
        ticks: Arc<AtomicUsize>,
    }

    impl Provider for ScriptedDisk {
        fn category(&self) -> ProviderCategory {
            ProviderCategory::Disk
        }

        fn sample(&mut self) -> ProviderResult {
            let call = self.ticks.fetch_add(1, Ordering::SeqCst);
            let mut devices = vec![DeviceIo {
                read_bytes_per_sec: 10_000_000.0,
                ..DeviceIo::idle("sda")
            }];
            // nvme0n1 only shows up on the first call, then goes quiet.
            if call == 0 {
                devices.push(DeviceIo::idle("nvme0n1"));
            }
            let total_read = devices.iter().map(|d| d.read_bytes_per_sec).sum();
            Ok(Reading::Disk(DiskActivity {
                devices,
                total_read_bytes_per_sec: total_read,
                total_write_bytes_per_sec: 0.0,
            }))
        }
    }

    struct SlowSensor {
        delay: Duration,
        timeout: Duration,
    }

    impl Provider for SlowSensor {
        fn category(&self) -> ProviderCategory {
            ProviderCategory::Sensors
        }

        fn sample(&mut self) -> ProviderResult {
            std::thread::sleep(self.delay);
            Ok(Reading::Sensors(SensorReadings {
                temperatures: Vec::new(),
                fans: Vec::new(),
                power: Vec::new(),
                battery: None,
            }))
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }
    }

    fn wait_for_ticks(monitor: &Monitor, ticks: u64) {
        for _ in 0..200 {
            if monitor.version() >= ticks {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("sampler did not reach {} ticks", ticks);
    }

    struct FixedDisk;

    impl Provider for FixedDisk {
        fn category(&self) -> ProviderCategory {
            ProviderCategory::Disk
        }

        fn sample(&mut self) -> ProviderResult {
            let device = DeviceIo {
                read_bytes_per_sec: 10_000_000.0,
                ..DeviceIo::idle("sdx")
            };
            Ok(Reading::Disk(DiskActivity {
                total_read_bytes_per_sec: device.read_bytes_per_sec,
                total_write_bytes_per_sec: 0.0,
                devices: vec![device],
            }))
        }
    }

    #[test]
    fn test_end_to_end_snapshots_and_history() {
        let providers: Vec<Box<dyn Provider>> =
            vec![Box::new(FixedCpu::new(42.0)), Box::new(FixedDisk)];
        let mut monitor = Monitor::with_providers(test_config(), providers).unwrap();
        wait_for_ticks(&monitor, 3);
        monitor.stop();

        let snapshot = monitor.current().expect("snapshot after 3 ticks");
        let cpu = snapshot.cpu.as_ready().expect("cpu ready");
        assert_eq!(cpu.usage_percent, 42.0);

        let disks = snapshot.disks.as_ready().expect("disks ready");
        let names: Vec<&str> = disks.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdx"]);
        assert_eq!(disks.devices[0].read_bytes_per_sec, 10_000_000.0);

        // No memory provider was registered at all.
        assert_eq!(snapshot.memory.absence(), Some(&Absence::NoProvider));

        let history = monitor.history();
        assert!(history.cpu.len() >= 3);
        assert!(history.cpu.iter().all(|s| s.usage == 42.0));
        assert!(history.disk.iter().all(|s| s.read_bytes_per_sec == 10_000_000.0));
        // Memory was never ready, so it contributed no samples.
        assert!(history.memory.is_empty());
    }

    #[test]
    fn test_slow_provider_does_not_block_others() {
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(FixedCpu::new(10.0)),
            Box::new(SlowSensor {
                delay: Duration::from_millis(400),
                timeout: Duration::from_millis(40),
            }),
        ];
        let mut monitor = Monitor::with_providers(test_config(), providers).unwrap();
        wait_for_ticks(&monitor, 2);
        monitor.stop();

        let snapshot = monitor.current().unwrap();
        assert!(snapshot.cpu.is_ready());
        assert_eq!(snapshot.sensors.absence(), Some(&Absence::Timeout));

        let diagnostics = monitor.diagnostics();
        assert!(diagnostics.provider_failures.get("sensors").copied().unwrap_or(0) >= 1);
    }

    #[test]
    fn test_duplicate_category_discards_tick() {
        // Two providers claiming the same category violate the
        // complete-or-absent publish rule, so no snapshot may land.
        let providers: Vec<Box<dyn Provider>> =
            vec![Box::new(FixedCpu::new(1.0)), Box::new(FixedCpu::new(2.0))];
        let mut monitor = Monitor::with_providers(test_config(), providers).unwrap();
        std::thread::sleep(Duration::from_millis(300));
        monitor.stop();

        assert!(monitor.current().is_none());
        assert_eq!(monitor.version(), 0);
        assert!(monitor.diagnostics().discarded_ticks >= 1);
    }

    #[test]
    fn test_queued_late_reply_counts_as_timeout() {
        // The sensor reply lands well past its 40ms deadline but sits
        // queued while the slow cpu provider is being collected. It must
        // still be reported as a timeout, not accepted.
        let mut cpu = FixedCpu::new(5.0);
        cpu.delay = Duration::from_millis(400);
        let providers: Vec<Box<dyn Provider>> = vec![
            Box::new(cpu),
            Box::new(SlowSensor {
                delay: Duration::from_millis(100),
                timeout: Duration::from_millis(40),
            }),
        ];
        let mut monitor = Monitor::with_providers(test_config(), providers).unwrap();
        wait_for_ticks(&monitor, 1);
        monitor.stop();

        let snapshot = monitor.current().unwrap();
        assert!(snapshot.cpu.is_ready());
        assert_eq!(snapshot.sensors.absence(), Some(&Absence::Timeout));
    }

    #[test]
    fn test_registry_keeps_vanished_device_as_zero_row() {
        let disk = ScriptedDisk {
            ticks: Arc::new(AtomicUsize::new(0)),
        };
        let mut monitor =
            Monitor::with_providers(test_config(), vec![Box::new(disk)]).unwrap();
        wait_for_ticks(&monitor, 3);
        monitor.stop();

        let snapshot = monitor.current().unwrap();
        let disks = snapshot.disks.as_ready().expect("disks ready");
        let names: Vec<&str> = disks.devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "nvme0n1"]);

        let nvme = &disks.devices[1];
        assert_eq!(nvme.read_bytes_per_sec, 0.0);
        assert_eq!(nvme.utilization_percent, 0.0);

        // Totals cover registered devices only.
        assert_eq!(disks.total_read_bytes_per_sec, 10_000_000.0);
    }

    #[test]
    fn test_throttled_provider_reuses_last_reading() {
        let mut cpu = FixedCpu::new(7.0);
        cpu.min_interval = Duration::from_secs(60);
        let calls = Arc::clone(&cpu.calls);

        let mut monitor =
            Monitor::with_providers(test_config(), vec![Box::new(cpu)]).unwrap();
        wait_for_ticks(&monitor, 4);
        monitor.stop();

        // Asked once, then served from the cached reading.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let snapshot = monitor.current().unwrap();
        assert_eq!(snapshot.cpu.as_ready().unwrap().usage_percent, 7.0);
    }

    #[test]
    fn test_wire_document_caps_device_lists() {
        struct ManyDisks;
        impl Provider for ManyDisks {
            fn category(&self) -> ProviderCategory {
                ProviderCategory::Disk
            }
            fn sample(&mut self) -> ProviderResult {
                let devices: Vec<DeviceIo> = (0u8..20)
                    .map(|i| DeviceIo::idle(&format!("sd{}{}", (b'a' + i / 10) as char, i % 10)))
                    .collect();
                Ok(Reading::Disk(DiskActivity {
                    devices,
                    total_read_bytes_per_sec: 0.0,
                    total_write_bytes_per_sec: 0.0,
                }))
            }
        }

        let mut monitor =
            Monitor::with_providers(test_config(), vec![Box::new(ManyDisks)]).unwrap();
        wait_for_ticks(&monitor, 1);
        monitor.stop();

        let document = monitor.wire_document();
        let snapshot = document.snapshot.expect("snapshot present");
        let disks = snapshot.disks.as_ready().unwrap();
        assert_eq!(disks.devices.len(), monitor.config().device_display_cap);
    }
}
