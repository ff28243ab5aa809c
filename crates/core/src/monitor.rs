use crate::config::EngineConfig;
use crate::error::Result;
use crate::history::{HistoryAggregator, HistorySeries};
use crate::model::{PermissionStatus, Reported, Snapshot};
use crate::permissions::PermissionCache;
use crate::providers::{self, Provider};
use crate::sampler::{Diagnostics, SamplerHandle, SamplerLoop, SamplerShared};
use crate::store::SnapshotStore;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// The engine facade: owns the sampler and exposes the pull-based read
/// side. Every accessor returns immediately from shared state; nothing
/// here ever blocks on acquisition.
pub struct Monitor {
    config: EngineConfig,
    store: Arc<SnapshotStore>,
    history: HistoryAggregator,
    permissions: Arc<PermissionCache>,
    diagnostics: Arc<Mutex<Diagnostics>>,
    sampler: SamplerHandle,
}

/// Everything a consumer renders in one pull: the live snapshot, the
/// rolling history, and sampler health.
#[derive(Debug, Clone, Serialize)]
pub struct WireDocument {
    pub snapshot: Option<Snapshot>,
    pub history: HistorySeries,
    pub diagnostics: Diagnostics,
}

impl Monitor {
    /// Start the engine with the built-in provider set. The only fatal
    /// error is failing to stand the sampler up; individual providers
    /// failing later degrade to per-category absences.
    pub fn start(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let providers = providers::default_providers(&config)?;
        Self::with_providers(config, providers)
    }

    /// Start with an explicit provider set. Test seam.
    pub fn with_providers(config: EngineConfig, providers: Vec<Box<dyn Provider>>) -> Result<Self> {
        let store = Arc::new(SnapshotStore::new());
        let history = HistoryAggregator::new(config.history_capacity);
        let permissions = PermissionCache::bootstrap(config.permission_refresh());
        let diagnostics = Arc::new(Mutex::new(Diagnostics::default()));

        let sampler = SamplerLoop::spawn(
            &config,
            providers,
            SamplerShared {
                store: Arc::clone(&store),
                history: history.clone(),
                permissions: Arc::clone(&permissions),
                diagnostics: Arc::clone(&diagnostics),
            },
        )?;

        Ok(Self {
            config,
            store,
            history,
            permissions,
            diagnostics,
            sampler,
        })
    }

    /// Most recent complete snapshot. `None` until the first tick lands.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    /// Monotonic snapshot version; bumps once per published tick.
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn last_update(&self) -> Option<SystemTime> {
        self.store.last_update()
    }

    pub fn history(&self) -> HistorySeries {
        self.history.series()
    }

    pub fn permissions(&self) -> PermissionStatus {
        self.permissions.latest()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot plus history in consumer form, with unbounded device
    /// lists capped for display.
    pub fn wire_document(&self) -> WireDocument {
        let snapshot = self.current().map(|snapshot| {
            let mut snapshot = (*snapshot).clone();
            self.cap_devices(&mut snapshot);
            snapshot
        });

        WireDocument {
            snapshot,
            history: self.history(),
            diagnostics: self.diagnostics(),
        }
    }

    fn cap_devices(&self, snapshot: &mut Snapshot) {
        let cap = self.config.device_display_cap;
        if cap == 0 {
            return;
        }
        if let Reported::Ready(ref mut disks) = snapshot.disks {
            disks.devices.truncate(cap);
        }
        if let Reported::Ready(ref mut networks) = snapshot.networks {
            networks.interfaces.truncate(cap);
        }
        if let Reported::Ready(ref mut gpus) = snapshot.gpus {
            gpus.truncate(cap);
        }
    }

    /// Stop the sampler and join its threads. Idempotent; also runs on
    /// drop.
    pub fn stop(&mut self) {
        self.sampler.stop();
    }
}
