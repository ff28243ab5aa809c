use crate::model::Snapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Single-writer, multi-reader holder of the latest published snapshot.
///
/// Publishing swaps an `Arc` behind a briefly-held write lock, so readers
/// either see the previous snapshot or the new one in full, never a
/// partially constructed value. Two `current()` calls with no intervening
/// publish return the identical `Arc`.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Option<Arc<Snapshot>>>,
    version: AtomicU64,
    last_update_ms: AtomicU64,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot. Only the sampler loop calls this.
    pub fn publish(&self, snapshot: Snapshot) {
        let stamp = snapshot
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        let published = Arc::new(snapshot);

        {
            let mut slot = self.current.write().expect("snapshot store poisoned");
            *slot = Some(published);
        }
        self.last_update_ms.store(stamp, Ordering::Release);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Latest published snapshot, or `None` before the first tick.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current.read().expect("snapshot store poisoned").clone()
    }

    /// Monotonic publish counter.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Wall-clock time of the last publish.
    pub fn last_update(&self) -> Option<SystemTime> {
        match self.last_update_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PermissionStatus, Reported, Absence};

    fn empty_snapshot(sequence: u64) -> Snapshot {
        Snapshot {
            timestamp: SystemTime::now(),
            sequence,
            cpu: Reported::Unavailable(Absence::NotYetSampled),
            memory: Reported::Unavailable(Absence::NotYetSampled),
            disks: Reported::Unavailable(Absence::NotYetSampled),
            networks: Reported::Unavailable(Absence::NotYetSampled),
            gpus: Reported::Unavailable(Absence::NotYetSampled),
            pcie: Reported::Unavailable(Absence::NotYetSampled),
            sensors: Reported::Unavailable(Absence::NotYetSampled),
            processes: Reported::Unavailable(Absence::NotYetSampled),
            system: Reported::Unavailable(Absence::NotYetSampled),
            permissions: PermissionStatus::pending(),
        }
    }

    #[test]
    fn test_empty_store_reports_nothing() {
        let store = SnapshotStore::new();
        assert!(store.current().is_none());
        assert!(store.last_update().is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_publish_replaces_atomically() {
        let store = SnapshotStore::new();
        store.publish(empty_snapshot(1));
        store.publish(empty_snapshot(2));

        let current = store.current().unwrap();
        assert_eq!(current.sequence, 2);
        assert_eq!(store.version(), 2);
        assert!(store.last_update().is_some());
    }

    #[test]
    fn test_current_is_idempotent_between_publishes() {
        let store = SnapshotStore::new();
        store.publish(empty_snapshot(1));

        let a = store.current().unwrap();
        let b = store.current().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_state() {
        let store = Arc::new(SnapshotStore::new());
        let mut handles = Vec::new();

        for _ in 0..4 {
            let reader = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(snapshot) = reader.current() {
                        // A published snapshot always carries a sequence.
                        assert!(snapshot.sequence > 0);
                    }
                }
            }));
        }

        for sequence in 1..=200 {
            store.publish(empty_snapshot(sequence));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.version(), 200);
    }
}
