use crate::model::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Processor sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuSample {
    pub time_ms: u64,
    pub usage: f32,
    pub frequency_mhz: u64,
}

/// Memory/swap sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySample {
    pub time_ms: u64,
    pub percent: f32,
    pub used: u64,
    pub available: u64,
    pub swap_percent: f32,
    pub swap_used: u64,
}

/// Aggregate storage throughput sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSample {
    pub time_ms: u64,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
}

/// Aggregate network throughput sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSample {
    pub time_ms: u64,
    pub rx_bytes_per_sec: f64,
    pub tx_bytes_per_sec: f64,
}

/// Temperature summary sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureSample {
    pub time_ms: u64,
    pub max_celsius: f32,
    pub average_celsius: f32,
}

/// Fan speed summary sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanSample {
    pub time_ms: u64,
    pub max_rpm: u32,
}

/// Fixed-capacity rolling buffer of past samples for one metric family.
///
/// Length never exceeds capacity; the oldest sample is evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }
}

impl<T: Clone> HistoryWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

/// All rolling windows, one per metric family.
#[derive(Debug)]
pub struct MetricHistory {
    pub cpu: HistoryWindow<CpuSample>,
    pub per_core: BTreeMap<usize, HistoryWindow<CpuSample>>,
    pub memory: HistoryWindow<MemorySample>,
    pub disk: HistoryWindow<DiskSample>,
    pub network: HistoryWindow<NetworkSample>,
    pub temperature: HistoryWindow<TemperatureSample>,
    pub fans: HistoryWindow<FanSample>,
    capacity: usize,
}

impl MetricHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            cpu: HistoryWindow::new(capacity),
            per_core: BTreeMap::new(),
            memory: HistoryWindow::new(capacity),
            disk: HistoryWindow::new(capacity),
            network: HistoryWindow::new(capacity),
            temperature: HistoryWindow::new(capacity),
            fans: HistoryWindow::new(capacity),
            capacity,
        }
    }
}

/// Owned clone of every window, oldest to newest, for readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySeries {
    pub cpu: Vec<CpuSample>,
    pub per_core: BTreeMap<usize, Vec<CpuSample>>,
    pub memory: Vec<MemorySample>,
    pub disk: Vec<DiskSample>,
    pub network: Vec<NetworkSample>,
    pub temperature: Vec<TemperatureSample>,
    pub fans: Vec<FanSample>,
}

fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Sole writer of the rolling windows; fed by the sampler once per tick.
#[derive(Debug, Clone)]
pub struct HistoryAggregator {
    inner: Arc<RwLock<MetricHistory>>,
}

impl HistoryAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricHistory::new(capacity))),
        }
    }

    /// Derive one compact sample per available metric family and append
    /// it. Unavailable categories simply contribute no sample this tick.
    pub fn record(&self, snapshot: &Snapshot) {
        let time_ms = epoch_ms(snapshot.timestamp);
        let mut history = self.inner.write().expect("history poisoned");

        if let Some(cpu) = snapshot.cpu.as_ready() {
            history.cpu.push(CpuSample {
                time_ms,
                usage: cpu.usage_percent,
                frequency_mhz: cpu.frequency_mhz,
            });
            let capacity = history.capacity;
            for core in &cpu.per_core {
                history
                    .per_core
                    .entry(core.id)
                    .or_insert_with(|| HistoryWindow::new(capacity))
                    .push(CpuSample {
                        time_ms,
                        usage: core.usage_percent,
                        frequency_mhz: core.frequency_mhz,
                    });
            }
        }

        if let Some(memory) = snapshot.memory.as_ready() {
            history.memory.push(MemorySample {
                time_ms,
                percent: memory.percent,
                used: memory.used,
                available: memory.available,
                swap_percent: memory.swap_percent,
                swap_used: memory.swap_used,
            });
        }

        if let Some(disks) = snapshot.disks.as_ready() {
            history.disk.push(DiskSample {
                time_ms,
                read_bytes_per_sec: disks.total_read_bytes_per_sec,
                write_bytes_per_sec: disks.total_write_bytes_per_sec,
            });
        }

        if let Some(networks) = snapshot.networks.as_ready() {
            history.network.push(NetworkSample {
                time_ms,
                rx_bytes_per_sec: networks.total_rx_bytes_per_sec,
                tx_bytes_per_sec: networks.total_tx_bytes_per_sec,
            });
        }

        if let Some(sensors) = snapshot.sensors.as_ready() {
            if !sensors.temperatures.is_empty() {
                let max = sensors
                    .temperatures
                    .iter()
                    .map(|t| t.celsius)
                    .fold(f32::MIN, f32::max);
                let sum: f32 = sensors.temperatures.iter().map(|t| t.celsius).sum();
                history.temperature.push(TemperatureSample {
                    time_ms,
                    max_celsius: max,
                    average_celsius: sum / sensors.temperatures.len() as f32,
                });
            }
            if !sensors.fans.is_empty() {
                let max_rpm = sensors.fans.iter().map(|f| f.rpm).max().unwrap_or(0);
                history.fans.push(FanSample { time_ms, max_rpm });
            }
        }
    }

    /// Owned, oldest-to-newest view of every window.
    pub fn series(&self) -> HistorySeries {
        let history = self.inner.read().expect("history poisoned");
        HistorySeries {
            cpu: history.cpu.to_vec(),
            per_core: history
                .per_core
                .iter()
                .map(|(id, window)| (*id, window.to_vec()))
                .collect(),
            memory: history.memory.to_vec(),
            disk: history.disk.to_vec(),
            network: history.network.to_vec(),
            temperature: history.temperature.to_vec(),
            fans: history.fans.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Absence, CoreUsage, CpuMetrics, DiskActivity, PermissionStatus, Reported,
    };

    fn snapshot_with_cpu(sequence: u64, usage: f32) -> Snapshot {
        Snapshot {
            timestamp: UNIX_EPOCH + Duration::from_secs(1000 + sequence),
            sequence,
            cpu: Reported::Ready(CpuMetrics {
                usage_percent: usage,
                frequency_mhz: 2400,
                logical_cores: 2,
                physical_cores: Some(2),
                load_avg_1: 0.0,
                load_avg_5: 0.0,
                load_avg_15: 0.0,
                context_switches: None,
                per_core: vec![
                    CoreUsage {
                        id: 0,
                        usage_percent: usage,
                        frequency_mhz: 2400,
                    },
                    CoreUsage {
                        id: 1,
                        usage_percent: usage / 2.0,
                        frequency_mhz: 2400,
                    },
                ],
            }),
            memory: Reported::Unavailable(Absence::NotYetSampled),
            disks: Reported::Ready(DiskActivity {
                devices: vec![],
                total_read_bytes_per_sec: 10.0 * sequence as f64,
                total_write_bytes_per_sec: 0.0,
            }),
            networks: Reported::Unavailable(Absence::Timeout),
            gpus: Reported::Ready(vec![]),
            pcie: Reported::Unavailable(Absence::NoProvider),
            sensors: Reported::Unavailable(Absence::NoProvider),
            processes: Reported::Unavailable(Absence::NotYetSampled),
            system: Reported::Unavailable(Absence::NotYetSampled),
            permissions: PermissionStatus::pending(),
        }
    }

    #[test]
    fn test_window_evicts_oldest_first() {
        let mut window = HistoryWindow::new(3);
        for value in 0..5 {
            window.push(value);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let aggregator = HistoryAggregator::new(4);
        for sequence in 1..=20 {
            aggregator.record(&snapshot_with_cpu(sequence, 50.0));
        }

        let series = aggregator.series();
        assert_eq!(series.cpu.len(), 4);
        assert_eq!(series.disk.len(), 4);
        for window in series.per_core.values() {
            assert_eq!(window.len(), 4);
        }
    }

    #[test]
    fn test_samples_are_time_ordered() {
        let aggregator = HistoryAggregator::new(16);
        for sequence in 1..=10 {
            aggregator.record(&snapshot_with_cpu(sequence, 10.0));
        }

        let series = aggregator.series();
        let times: Vec<u64> = series.cpu.iter().map(|s| s.time_ms).collect();
        let mut sorted = times.clone();
        sorted.sort_unstable();
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_unavailable_categories_contribute_no_sample() {
        let aggregator = HistoryAggregator::new(8);
        aggregator.record(&snapshot_with_cpu(1, 42.0));

        let series = aggregator.series();
        assert_eq!(series.cpu.len(), 1);
        assert_eq!(series.cpu[0].usage, 42.0);
        // Network timed out, sensors unavailable: no samples recorded.
        assert!(series.network.is_empty());
        assert!(series.temperature.is_empty());
        assert!(series.fans.is_empty());
        assert!(series.memory.is_empty());
    }
}
