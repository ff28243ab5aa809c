use crate::error::Result;
use crate::model::{PcieLink, PcieTopology};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::Duration;

#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use std::path::Path;

/// PCIe link topology from sysfs: negotiated speed and width per device,
/// plus the device's maximums. Not every PCI function exposes link
/// attributes; those fields stay `None` and the link still lists.
pub struct PcieProvider {
    timeout: Duration,
}

impl PcieProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self { timeout })
    }

    /// "8.0 GT/s PCIe" -> 8.0
    fn parse_speed(value: &str) -> Option<f64> {
        let digits: String = value
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        digits.parse().ok()
    }

    fn parse_width(value: &str) -> Option<u32> {
        value.trim().parse().ok()
    }

    #[cfg(target_os = "linux")]
    fn links() -> Vec<PcieLink> {
        let mut links = Vec::new();
        let Ok(entries) = fs::read_dir(Path::new("/sys/bus/pci/devices")) else {
            return links;
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            let read = |name: &str| {
                fs::read_to_string(dir.join(name))
                    .ok()
                    .map(|s| s.trim().to_string())
            };

            links.push(PcieLink {
                address: entry.file_name().to_string_lossy().to_string(),
                vendor_id: read("vendor"),
                device_id: read("device"),
                link_speed_gtps: read("current_link_speed")
                    .as_deref()
                    .and_then(Self::parse_speed),
                link_width: read("current_link_width")
                    .as_deref()
                    .and_then(Self::parse_width),
                max_link_speed_gtps: read("max_link_speed")
                    .as_deref()
                    .and_then(Self::parse_speed),
                max_link_width: read("max_link_width")
                    .as_deref()
                    .and_then(Self::parse_width),
            });
        }

        links.sort_by(|a, b| a.address.cmp(&b.address));
        links
    }

    #[cfg(not(target_os = "linux"))]
    fn links() -> Vec<PcieLink> {
        Vec::new()
    }
}

impl Provider for PcieProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Pcie
    }

    fn sample(&mut self) -> ProviderResult {
        Ok(Reading::Pcie(PcieTopology {
            links: Self::links(),
        }))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
