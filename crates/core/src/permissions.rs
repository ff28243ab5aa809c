use crate::model::{PermissionLevel, PermissionStatus};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use std::{env, fs};

/// Classification thresholds. Tuning values, not invariants; boundaries
/// are inclusive (exactly 80 classifies as Good, exactly 40 as Partial).
pub const FULL_THRESHOLD: u8 = 95;
pub const GOOD_THRESHOLD: u8 = 80;
pub const PARTIAL_THRESHOLD: u8 = 40;
pub const CONTAINER_GOOD_THRESHOLD: u8 = 60;

/// Privileged system-information paths whose readability determines the
/// access level. Hardware sensor paths additionally produce warnings
/// when inaccessible.
const CRITICAL_PATHS: &[(&str, &str)] = &[
    ("proc_meminfo", "/proc/meminfo"),
    ("proc_cpuinfo", "/proc/cpuinfo"),
    ("proc_stat", "/proc/stat"),
    ("proc_diskstats", "/proc/diskstats"),
    ("sys_dmi", "/sys/class/dmi/id/product_name"),
    ("sys_hwmon", "/sys/class/hwmon"),
    ("sys_cpu", "/sys/devices/system/cpu"),
    ("sys_thermal", "/sys/class/thermal"),
    ("sys_block", "/sys/block"),
];

const HARDWARE_PATH_KEYS: &[&str] = &["sys_hwmon", "sys_thermal", "sys_dmi"];

/// Map an access percentage to a coarse level.
pub fn classify(access_percentage: u8, has_root: bool, is_container: bool) -> PermissionLevel {
    if is_container {
        return if access_percentage >= CONTAINER_GOOD_THRESHOLD {
            PermissionLevel::ContainerGood
        } else {
            PermissionLevel::ContainerLimited
        };
    }
    if has_root || access_percentage >= FULL_THRESHOLD {
        PermissionLevel::Full
    } else if access_percentage >= GOOD_THRESHOLD {
        PermissionLevel::Good
    } else if access_percentage >= PARTIAL_THRESHOLD {
        PermissionLevel::Partial
    } else {
        PermissionLevel::Limited
    }
}

fn path_is_readable(path: &Path) -> bool {
    if path.is_dir() {
        fs::read_dir(path).is_ok()
    } else {
        fs::read(path).is_ok()
    }
}

fn detect_container() -> bool {
    if Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists() {
        return true;
    }
    if env::var_os("container").is_some()
        || env::var_os("DOCKER_CONTAINER").is_some()
        || env::var_os("KUBERNETES_SERVICE_HOST").is_some()
    {
        return true;
    }
    if let Ok(cgroup) = fs::read_to_string("/proc/1/cgroup") {
        if ["docker", "containerd", "lxc"]
            .iter()
            .any(|marker| cgroup.contains(marker))
        {
            return true;
        }
    }
    false
}

#[cfg(unix)]
fn has_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn has_root() -> bool {
    false
}

/// Inspects accessibility of privileged telemetry paths and classifies
/// the execution context. Cheap enough to run on a background thread;
/// never fatal — an unreadable path is recorded, not raised.
#[derive(Debug, Default)]
pub struct PermissionProbe;

impl PermissionProbe {
    pub fn probe() -> PermissionStatus {
        let root = has_root();
        let is_container = detect_container();

        let mut accessible_paths = BTreeMap::new();
        let mut warnings = Vec::new();
        let mut accessible = 0usize;

        for (key, path) in CRITICAL_PATHS {
            let ok = path_is_readable(Path::new(path));
            if ok {
                accessible += 1;
            } else if HARDWARE_PATH_KEYS.contains(key) {
                warnings.push(format!("no access to {} - hardware data limited", path));
            }
            accessible_paths.insert((*key).to_string(), ok);
        }

        let access_percentage =
            ((accessible as f64 / CRITICAL_PATHS.len() as f64) * 100.0).round() as u8;
        let level = classify(access_percentage, root, is_container);

        match level {
            PermissionLevel::Limited => {
                warnings.push(
                    "insufficient permissions - consider running with elevated privileges"
                        .to_string(),
                );
            }
            PermissionLevel::ContainerGood => {
                warnings.push("running in a container - some metrics may be limited".to_string());
            }
            PermissionLevel::ContainerLimited => {
                warnings.push("container with restricted host access".to_string());
            }
            _ => {}
        }

        PermissionStatus {
            level,
            access_percentage,
            has_root: root,
            is_container,
            accessible_paths,
            warnings,
        }
    }
}

/// Cached permission status with lazy background refresh.
///
/// The sampler reads the last cached value on every tick; when the cache
/// interval expires a refresh runs on its own thread so the probe's
/// filesystem scan never blocks the hot path.
#[derive(Debug)]
pub struct PermissionCache {
    status: RwLock<PermissionStatus>,
    refreshed: Mutex<Instant>,
    refresh_interval: Duration,
    refresh_in_flight: AtomicBool,
}

impl PermissionCache {
    /// Probe synchronously once, then cache for `refresh_interval`.
    pub fn bootstrap(refresh_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: RwLock::new(PermissionProbe::probe()),
            refreshed: Mutex::new(Instant::now()),
            refresh_interval,
            refresh_in_flight: AtomicBool::new(false),
        })
    }

    /// Cache seeded with a known status; no probing. For tests.
    pub fn fixed(status: PermissionStatus) -> Arc<Self> {
        Arc::new(Self {
            status: RwLock::new(status),
            refreshed: Mutex::new(Instant::now()),
            refresh_interval: Duration::from_secs(u64::MAX / 4),
            refresh_in_flight: AtomicBool::new(false),
        })
    }

    pub fn latest(&self) -> PermissionStatus {
        self.status.read().expect("permission cache poisoned").clone()
    }

    /// Kick off a background re-probe if the cached value has expired.
    /// Returns immediately either way.
    pub fn refresh_if_stale(self: &Arc<Self>) {
        {
            let refreshed = self.refreshed.lock().expect("permission cache poisoned");
            if refreshed.elapsed() < self.refresh_interval {
                return;
            }
        }
        if self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let cache = Arc::clone(self);
        std::thread::Builder::new()
            .name("permission-probe".to_string())
            .spawn(move || {
                let status = PermissionProbe::probe();
                tracing::debug!(
                    level = status.level.as_str(),
                    access = status.access_percentage,
                    "permission probe refreshed"
                );
                *cache.status.write().expect("permission cache poisoned") = status;
                *cache.refreshed.lock().expect("permission cache poisoned") = Instant::now();
                cache.refresh_in_flight.store(false, Ordering::Release);
            })
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_thresholds() {
        assert_eq!(classify(100, false, false), PermissionLevel::Full);
        assert_eq!(classify(95, false, false), PermissionLevel::Full);
        assert_eq!(classify(85, false, false), PermissionLevel::Good);
        assert_eq!(classify(80, false, false), PermissionLevel::Good);
        assert_eq!(classify(79, false, false), PermissionLevel::Partial);
        assert_eq!(classify(40, false, false), PermissionLevel::Partial);
        assert_eq!(classify(39, false, false), PermissionLevel::Limited);
        assert_eq!(classify(35, false, false), PermissionLevel::Limited);
        assert_eq!(classify(0, false, false), PermissionLevel::Limited);
    }

    #[test]
    fn test_root_is_always_full() {
        assert_eq!(classify(10, true, false), PermissionLevel::Full);
    }

    #[test]
    fn test_container_levels() {
        assert_eq!(classify(85, false, true), PermissionLevel::ContainerGood);
        assert_eq!(classify(60, false, true), PermissionLevel::ContainerGood);
        assert_eq!(classify(59, false, true), PermissionLevel::ContainerLimited);
        assert_eq!(classify(10, false, true), PermissionLevel::ContainerLimited);
    }

    #[test]
    fn test_probe_never_panics() {
        let status = PermissionProbe::probe();
        assert!(status.access_percentage <= 100);
        assert_eq!(status.accessible_paths.len(), CRITICAL_PATHS.len());
    }

    #[test]
    fn test_fixed_cache_serves_seeded_value() {
        let mut status = PermissionStatus::pending();
        status.access_percentage = 85;
        status.level = PermissionLevel::Good;
        let cache = PermissionCache::fixed(status);

        let latest = cache.latest();
        assert_eq!(latest.level, PermissionLevel::Good);
        assert_eq!(latest.access_percentage, 85);

        // Not stale, so this is a no-op.
        cache.refresh_if_stale();
        assert_eq!(cache.latest().access_percentage, 85);
    }
}
