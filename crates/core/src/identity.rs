use std::collections::{HashMap, HashSet};

/// Device category covered by identity stabilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Storage,
    Accelerator,
}

impl DeviceClass {
    /// Inclusion policy: does a candidate key name a real device of this
    /// class? Virtual, loopback and compressed-memory pseudo-devices are
    /// rejected so they never enter the registry.
    pub fn admits(&self, name: &str) -> bool {
        match self {
            Self::Storage => {
                const EXCLUDED: &[&str] = &["loop", "zram", "ram", "sr", "dm-", "md", "fd"];
                const INCLUDED: &[&str] = &["sd", "hd", "vd", "xvd", "nvme", "mmcblk"];

                let base = name.strip_prefix("/dev/").unwrap_or(name);
                if base.is_empty() || EXCLUDED.iter().any(|p| base.starts_with(p)) {
                    return false;
                }
                INCLUDED.iter().any(|p| base.starts_with(p))
            }
            Self::Accelerator => !name.trim().is_empty(),
        }
    }
}

/// Insertion-ordered registry of device keys for one device class.
///
/// A key that passes the inclusion policy stays registered for the
/// lifetime of the process, even across ticks where the provider reports
/// nothing for it. Bounded in practice by the host's real device count.
#[derive(Debug)]
pub struct DeviceRegistry {
    class: DeviceClass,
    order: Vec<String>,
    seen: HashSet<String>,
}

impl DeviceRegistry {
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Register every candidate key that passes the inclusion policy.
    /// Keys already registered keep their original position.
    pub fn observe<'a, I: IntoIterator<Item = &'a str>>(&mut self, candidates: I) {
        for name in candidates {
            let key = name.strip_prefix("/dev/").unwrap_or(name);
            if !self.class.admits(key) || self.seen.contains(key) {
                continue;
            }
            self.seen.insert(key.to_string());
            self.order.push(key.to_string());
        }
    }

    /// Produce one reading per registered key, in registration order.
    ///
    /// The tick's reading is used when present; otherwise `idle`
    /// synthesizes an explicit zero-valued reading so the row never
    /// disappears. Deterministic for a given registry and input.
    pub fn reconcile<T, F>(&self, current: &HashMap<String, T>, idle: F) -> Vec<T>
    where
        T: Clone,
        F: Fn(&str) -> T,
    {
        self.order
            .iter()
            .map(|key| current.get(key).cloned().unwrap_or_else(|| idle(key)))
            .collect()
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceIo;

    #[test]
    fn test_storage_policy_rejects_pseudo_devices() {
        let class = DeviceClass::Storage;
        assert!(class.admits("sda"));
        assert!(class.admits("/dev/nvme0n1"));
        assert!(class.admits("mmcblk0"));
        assert!(class.admits("vda"));

        assert!(!class.admits("loop0"));
        assert!(!class.admits("zram0"));
        assert!(!class.admits("ram1"));
        assert!(!class.admits("sr0"));
        assert!(!class.admits("dm-0"));
        assert!(!class.admits(""));
    }

    #[test]
    fn test_registry_preserves_insertion_order() {
        let mut registry = DeviceRegistry::new(DeviceClass::Storage);
        registry.observe(["sdb", "sda", "loop0"]);
        registry.observe(["nvme0n1", "sda"]);

        assert_eq!(registry.keys(), &["sdb", "sda", "nvme0n1"]);
    }

    #[test]
    fn test_reconcile_synthesizes_zero_readings() {
        let mut registry = DeviceRegistry::new(DeviceClass::Storage);
        registry.observe(["sda", "nvme0n1"]);

        // Tick 5: provider only reports sda.
        let mut tick = HashMap::new();
        let mut busy = DeviceIo::idle("sda");
        busy.read_bytes_per_sec = 100.0;
        tick.insert("sda".to_string(), busy);

        let reconciled = registry.reconcile(&tick, DeviceIo::idle);
        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled[0].name, "sda");
        assert_eq!(reconciled[0].read_bytes_per_sec, 100.0);
        assert_eq!(reconciled[1].name, "nvme0n1");
        assert_eq!(reconciled[1].read_bytes_per_sec, 0.0);
        assert_eq!(reconciled[1].write_bytes_per_sec, 0.0);
        assert_eq!(reconciled[1].utilization_percent, 0.0);
    }

    #[test]
    fn test_registered_keys_never_drop() {
        let mut registry = DeviceRegistry::new(DeviceClass::Storage);
        registry.observe(["sda"]);

        // Many ticks with no reading at all.
        for _ in 0..10 {
            registry.observe(std::iter::empty::<&str>());
            let out = registry.reconcile(&HashMap::new(), DeviceIo::idle);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].name, "sda");
        }
    }

    #[test]
    fn test_accelerator_policy() {
        let class = DeviceClass::Accelerator;
        assert!(class.admits("NVIDIA GeForce RTX 3080"));
        assert!(!class.admits("   "));
    }
}
