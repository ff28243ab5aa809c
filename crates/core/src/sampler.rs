use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::history::HistoryAggregator;
use crate::identity::{DeviceClass, DeviceRegistry};
use crate::model::{
    Absence, DeviceIo, DiskActivity, GpuStats, PermissionStatus, Reported, Snapshot,
};
use crate::permissions::PermissionCache;
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use crate::store::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

/// Sequence number that tells a worker to shut down.
const STOP_SEQ: u64 = u64::MAX;

/// How often a failing category is worth a log line.
const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Rolling counters describing sampler health.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub ticks: u64,
    pub discarded_ticks: u64,
    pub last_tick_duration_ms: u64,
    /// Ticks in a row where at least one provider failed; resets on a
    /// fully clean tick.
    pub consecutive_failures: u64,
    pub provider_failures: BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

/// One provider running on its own worker thread, fed tick sequence
/// numbers and replying with tagged results.
struct Worker {
    category: ProviderCategory,
    timeout: Duration,
    min_interval: Duration,
    last_asked: Option<Instant>,
    last_reading: Option<Reading>,
    req_tx: Sender<u64>,
    res_rx: Receiver<(u64, Instant, ProviderResult)>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(mut provider: Box<dyn Provider>) -> Result<Self> {
        let category = provider.category();
        let timeout = provider.timeout();
        let min_interval = provider.min_interval();
        let (req_tx, req_rx) = mpsc::channel::<u64>();
        let (res_tx, res_rx) = mpsc::channel::<(u64, Instant, ProviderResult)>();

        let handle = std::thread::Builder::new()
            .name(format!("provider-{}", category.as_str()))
            .spawn(move || loop {
                let Ok(mut seq) = req_rx.recv() else {
                    break;
                };
                // A worker that fell behind only answers the newest request.
                while let Ok(newer) = req_rx.try_recv() {
                    seq = newer;
                }
                if seq == STOP_SEQ {
                    break;
                }

                let result = match catch_unwind(AssertUnwindSafe(|| provider.sample())) {
                    Ok(result) => result,
                    Err(_) => Err(Absence::Error("provider panicked".to_string())),
                };
                // Arrival stamp, so the loop can tell an in-deadline
                // reply from one that merely sat queued behind a
                // slower sibling's collection.
                if res_tx.send((seq, Instant::now(), result)).is_err() {
                    break;
                }
            })
            .map_err(|e| {
                EngineError::sampler(format!(
                    "failed to spawn {} worker: {}",
                    category.as_str(),
                    e
                ))
            })?;

        Ok(Self {
            category,
            timeout,
            min_interval,
            last_asked: None,
            last_reading: None,
            req_tx,
            res_rx,
            handle: Some(handle),
        })
    }

    /// Should this worker be asked this tick, or is it throttled?
    fn due(&self, now: Instant) -> bool {
        match self.last_asked {
            Some(at) => now.duration_since(at) >= self.min_interval,
            None => true,
        }
    }

    /// Wait for this tick's reply, dropping any stale replies from
    /// earlier ticks that straddled their deadline. A reply for this
    /// tick that was produced after the deadline counts as a timeout
    /// even if it is already queued by the time we look.
    fn collect(&self, seq: u64, deadline: Instant) -> std::result::Result<ProviderResult, Absence> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.res_rx.recv_timeout(remaining) {
                Ok((reply_seq, arrived, result)) if reply_seq == seq => {
                    if arrived > deadline {
                        return Err(Absence::Timeout);
                    }
                    return Ok(result);
                }
                Ok(_) => continue, // late reply from a previous tick
                Err(RecvTimeoutError::Timeout) => return Err(Absence::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Absence::Error("provider worker exited".to_string()))
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.req_tx.send(STOP_SEQ).ok();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

/// Shared engine state the sampler publishes into.
pub(crate) struct SamplerShared {
    pub store: Arc<SnapshotStore>,
    pub history: HistoryAggregator,
    pub permissions: Arc<PermissionCache>,
    pub diagnostics: Arc<Mutex<Diagnostics>>,
}

/// Per-tick snapshot assembly. Every category starts as an explicit
/// absence and may be set exactly once; a second set is a programming
/// error that discards the whole tick.
struct TickAssembly {
    cpu: Option<Reported<crate::model::CpuMetrics>>,
    memory: Option<Reported<crate::model::MemoryMetrics>>,
    disks: Option<Reported<DiskActivity>>,
    networks: Option<Reported<crate::model::NetworkActivity>>,
    gpus: Option<Reported<Vec<GpuStats>>>,
    pcie: Option<Reported<crate::model::PcieTopology>>,
    sensors: Option<Reported<crate::model::SensorReadings>>,
    processes: Option<Reported<crate::model::ProcessTable>>,
    system: Option<Reported<crate::model::SystemFacts>>,
    duplicate: Option<ProviderCategory>,
}

impl TickAssembly {
    fn new() -> Self {
        Self {
            cpu: None,
            memory: None,
            disks: None,
            networks: None,
            gpus: None,
            pcie: None,
            sensors: None,
            processes: None,
            system: None,
            duplicate: None,
        }
    }

    fn set_reading(&mut self, reading: Reading) {
        match reading {
            Reading::Cpu(v) => Self::put(&mut self.cpu, Reported::Ready(v), ProviderCategory::Cpu, &mut self.duplicate),
            Reading::Memory(v) => Self::put(&mut self.memory, Reported::Ready(v), ProviderCategory::Memory, &mut self.duplicate),
            Reading::Disk(v) => Self::put(&mut self.disks, Reported::Ready(v), ProviderCategory::Disk, &mut self.duplicate),
            Reading::Network(v) => Self::put(&mut self.networks, Reported::Ready(v), ProviderCategory::Network, &mut self.duplicate),
            Reading::Gpu(v) => Self::put(&mut self.gpus, Reported::Ready(v), ProviderCategory::Gpu, &mut self.duplicate),
            Reading::Pcie(v) => Self::put(&mut self.pcie, Reported::Ready(v), ProviderCategory::Pcie, &mut self.duplicate),
            Reading::Sensors(v) => Self::put(&mut self.sensors, Reported::Ready(v), ProviderCategory::Sensors, &mut self.duplicate),
            Reading::Processes(v) => Self::put(&mut self.processes, Reported::Ready(v), ProviderCategory::Processes, &mut self.duplicate),
            Reading::System(v) => Self::put(&mut self.system, Reported::Ready(v), ProviderCategory::System, &mut self.duplicate),
        }
    }

    fn set_absence(&mut self, category: ProviderCategory, reason: Absence) {
        match category {
            ProviderCategory::Cpu => Self::put(&mut self.cpu, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Memory => Self::put(&mut self.memory, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Disk => Self::put(&mut self.disks, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Network => Self::put(&mut self.networks, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Gpu => Self::put(&mut self.gpus, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Pcie => Self::put(&mut self.pcie, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Sensors => Self::put(&mut self.sensors, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::Processes => Self::put(&mut self.processes, Reported::Unavailable(reason), category, &mut self.duplicate),
            ProviderCategory::System => Self::put(&mut self.system, Reported::Unavailable(reason), category, &mut self.duplicate),
        }
    }

    fn put<T>(
        slot: &mut Option<Reported<T>>,
        value: Reported<T>,
        category: ProviderCategory,
        duplicate: &mut Option<ProviderCategory>,
    ) {
        if slot.is_some() {
            *duplicate = Some(category);
        } else {
            *slot = Some(value);
        }
    }

    /// Finish the tick. `None` means the publish invariant was violated
    /// and the previous snapshot stays current.
    fn build(self, sequence: u64, permissions: PermissionStatus) -> Option<Snapshot> {
        if let Some(category) = self.duplicate {
            tracing::warn!(
                category = category.as_str(),
                "duplicate category result; discarding tick"
            );
            return None;
        }

        fn missing<T>() -> Reported<T> {
            Reported::Unavailable(Absence::NoProvider)
        }
        Some(Snapshot {
            timestamp: SystemTime::now(),
            sequence,
            cpu: self.cpu.unwrap_or_else(missing),
            memory: self.memory.unwrap_or_else(missing),
            disks: self.disks.unwrap_or_else(missing),
            networks: self.networks.unwrap_or_else(missing),
            gpus: self.gpus.unwrap_or_else(missing),
            pcie: self.pcie.unwrap_or_else(missing),
            sensors: self.sensors.unwrap_or_else(missing),
            processes: self.processes.unwrap_or_else(missing),
            system: self.system.unwrap_or_else(missing),
            permissions,
        })
    }
}

/// The periodic driver: one dedicated thread, one tick per interval,
/// every enabled provider asked exactly once per tick.
pub struct SamplerLoop {
    workers: Vec<Worker>,
    storage_registry: DeviceRegistry,
    accelerator_registry: DeviceRegistry,
    shared: SamplerShared,
    tick_interval: Duration,
    last_failure_log: HashMap<ProviderCategory, Instant>,
    sequence: u64,
}

impl SamplerLoop {
    pub(crate) fn spawn(
        config: &EngineConfig,
        providers: Vec<Box<dyn Provider>>,
        shared: SamplerShared,
    ) -> Result<SamplerHandle> {
        let mut workers = Vec::with_capacity(providers.len());
        for provider in providers {
            workers.push(Worker::spawn(provider)?);
        }

        let mut sampler = Self {
            workers,
            storage_registry: DeviceRegistry::new(DeviceClass::Storage),
            accelerator_registry: DeviceRegistry::new(DeviceClass::Accelerator),
            shared,
            tick_interval: config.tick_interval(),
            last_failure_log: HashMap::new(),
            sequence: 0,
        };

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || sampler.run(stop_rx))
            .map_err(|e| EngineError::sampler(format!("failed to spawn sampler thread: {}", e)))?;

        Ok(SamplerHandle {
            stop_tx,
            handle: Some(handle),
        })
    }

    fn run(&mut self, stop_rx: Receiver<()>) {
        loop {
            let started = Instant::now();
            self.tick();
            let elapsed = started.elapsed();

            let delay = self.tick_interval.saturating_sub(elapsed);
            match stop_rx.recv_timeout(delay.max(Duration::from_millis(1))) {
                // Stop requested, or the handle was dropped.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => continue,
            }
        }

        for worker in &mut self.workers {
            worker.shutdown();
        }
        tracing::debug!("sampler stopped after {} ticks", self.sequence);
    }

    fn tick(&mut self) {
        self.sequence += 1;
        let seq = self.sequence;
        let started = Instant::now();

        // Ask every due worker; throttled ones re-use their last reading.
        let mut asked = vec![false; self.workers.len()];
        for (index, worker) in self.workers.iter_mut().enumerate() {
            if worker.due(started) {
                if worker.req_tx.send(seq).is_ok() {
                    worker.last_asked = Some(started);
                    asked[index] = true;
                }
            }
        }

        let mut assembly = TickAssembly::new();
        let mut failed_this_tick = false;
        for (index, worker) in self.workers.iter_mut().enumerate() {
            if !asked[index] {
                match worker.last_reading.clone() {
                    Some(reading) => assembly.set_reading(reading),
                    None => assembly.set_absence(worker.category, Absence::NotYetSampled),
                }
                continue;
            }

            let deadline = started + worker.timeout;
            match worker.collect(seq, deadline) {
                Ok(Ok(reading)) => {
                    worker.last_reading = Some(reading.clone());
                    assembly.set_reading(reading);
                }
                Ok(Err(reason)) | Err(reason) => {
                    failed_this_tick = true;
                    Self::note_failure(
                        &self.shared.diagnostics,
                        &mut self.last_failure_log,
                        worker.category,
                        &reason,
                    );
                    assembly.set_absence(worker.category, reason);
                }
            }
        }

        // Stabilize device-keyed categories before publishing.
        assembly.disks = match assembly.disks.take() {
            Some(Reported::Ready(disks)) => Some(Reported::Ready(self.reconcile_disks(disks))),
            other => other,
        };
        assembly.gpus = match assembly.gpus.take() {
            Some(Reported::Ready(gpus)) => Some(Reported::Ready(self.reconcile_gpus(gpus))),
            other => other,
        };

        let permissions = self.shared.permissions.latest();
        self.shared.permissions.refresh_if_stale();

        let duration_ms = started.elapsed().as_millis() as u64;
        match assembly.build(seq, permissions) {
            Some(snapshot) => {
                self.shared.store.publish(snapshot);
                if let Some(published) = self.shared.store.current() {
                    self.shared.history.record(&published);
                }
                if let Ok(mut diagnostics) = self.shared.diagnostics.lock() {
                    diagnostics.ticks = seq;
                    diagnostics.last_tick_duration_ms = duration_ms;
                    if failed_this_tick {
                        diagnostics.consecutive_failures += 1;
                    } else {
                        diagnostics.consecutive_failures = 0;
                    }
                }
            }
            None => {
                if let Ok(mut diagnostics) = self.shared.diagnostics.lock() {
                    diagnostics.discarded_ticks += 1;
                    diagnostics.last_error = Some("publish invariant violation".to_string());
                }
            }
        }
    }

    /// Filter candidates through the inclusion policy, grow the registry,
    /// and emit one row per registered device (zero-filled when idle).
    fn reconcile_disks(&mut self, activity: DiskActivity) -> DiskActivity {
        self.storage_registry
            .observe(activity.devices.iter().map(|d| d.name.as_str()));

        let by_name: HashMap<String, DeviceIo> = activity
            .devices
            .into_iter()
            .map(|device| (device.name.clone(), device))
            .collect();
        let devices = self.storage_registry.reconcile(&by_name, DeviceIo::idle);

        let total_read_bytes_per_sec = devices.iter().map(|d| d.read_bytes_per_sec).sum();
        let total_write_bytes_per_sec = devices.iter().map(|d| d.write_bytes_per_sec).sum();

        DiskActivity {
            devices,
            total_read_bytes_per_sec,
            total_write_bytes_per_sec,
        }
    }

    fn reconcile_gpus(&mut self, gpus: Vec<GpuStats>) -> Vec<GpuStats> {
        self.accelerator_registry
            .observe(gpus.iter().map(|g| g.name.as_str()));

        let by_name: HashMap<String, GpuStats> = gpus
            .into_iter()
            .map(|gpu| (gpu.name.clone(), gpu))
            .collect();
        self.accelerator_registry.reconcile(&by_name, GpuStats::idle)
    }

    fn note_failure(
        diagnostics: &Arc<Mutex<Diagnostics>>,
        last_logged: &mut HashMap<ProviderCategory, Instant>,
        category: ProviderCategory,
        reason: &Absence,
    ) {
        if let Ok(mut diagnostics) = diagnostics.lock() {
            *diagnostics
                .provider_failures
                .entry(category.as_str().to_string())
                .or_insert(0) += 1;
            diagnostics.last_error = Some(format!("{}: {}", category.as_str(), reason));
        }

        // Expected absences (missing hardware) would otherwise spam the
        // log once per tick.
        let now = Instant::now();
        let due = last_logged
            .get(&category)
            .map(|at| now.duration_since(*at) >= FAILURE_LOG_INTERVAL)
            .unwrap_or(true);
        if due {
            tracing::warn!(category = category.as_str(), %reason, "provider unavailable");
            last_logged.insert(category, now);
        }
    }
}

/// Clean-stop handle for the sampler thread. The in-flight tick finishes
/// (or hits its provider timeout bound) before the loop halts.
pub struct SamplerHandle {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SamplerHandle {
    pub fn stop(&mut self) {
        self.stop_tx.send(()).ok();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
