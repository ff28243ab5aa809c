use crate::error::Result;
use crate::model::{InterfaceIo, NetworkActivity};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use sysinfo::Networks;

/// Interfaces excluded from output: loopback and the common virtual
/// bridge/tunnel prefixes.
const VIRTUAL_PREFIXES: &[&str] = &["lo", "veth", "docker", "br-", "virbr", "tun", "tap"];

fn is_virtual(name: &str) -> bool {
    VIRTUAL_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Per-interface network throughput via sysinfo, with rate deltas
/// computed against the previous sample.
pub struct NetworkProvider {
    networks: Networks,
    previous: HashMap<String, (u64, u64)>,
    previous_at: Option<Instant>,
    timeout: Duration,
}

impl NetworkProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut provider = Self {
            networks: Networks::new_with_refreshed_list(),
            previous: HashMap::new(),
            previous_at: None,
            timeout,
        };

        for (name, data) in &provider.networks {
            provider
                .previous
                .insert(name.clone(), (data.total_received(), data.total_transmitted()));
        }
        provider.previous_at = Some(Instant::now());

        Ok(provider)
    }
}

impl Provider for NetworkProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Network
    }

    fn sample(&mut self) -> ProviderResult {
        self.networks.refresh_list();
        self.networks.refresh();

        let now = Instant::now();
        let elapsed = self
            .previous_at
            .map(|at| now.duration_since(at).as_secs_f64())
            .unwrap_or(0.0)
            .max(1e-6);

        let mut interfaces = Vec::new();
        let mut next_previous = HashMap::new();

        for (name, data) in &self.networks {
            let rx_bytes = data.total_received();
            let tx_bytes = data.total_transmitted();
            next_previous.insert(name.clone(), (rx_bytes, tx_bytes));

            if is_virtual(name) {
                continue;
            }

            let (rx_rate, tx_rate) = match self.previous.get(name.as_str()) {
                Some((prev_rx, prev_tx)) => (
                    rx_bytes.saturating_sub(*prev_rx) as f64 / elapsed,
                    tx_bytes.saturating_sub(*prev_tx) as f64 / elapsed,
                ),
                None => (0.0, 0.0),
            };

            interfaces.push(InterfaceIo {
                name: name.clone(),
                rx_bytes_per_sec: rx_rate,
                tx_bytes_per_sec: tx_rate,
                rx_bytes,
                tx_bytes,
                rx_packets: data.total_packets_received(),
                tx_packets: data.total_packets_transmitted(),
                rx_errors: data.total_errors_on_received(),
                tx_errors: data.total_errors_on_transmitted(),
            });
        }

        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        let total_rx_bytes_per_sec = interfaces.iter().map(|i| i.rx_bytes_per_sec).sum();
        let total_tx_bytes_per_sec = interfaces.iter().map(|i| i.tx_bytes_per_sec).sum();

        self.previous = next_previous;
        self.previous_at = Some(now);

        Ok(Reading::Network(NetworkActivity {
            interfaces,
            total_rx_bytes_per_sec,
            total_tx_bytes_per_sec,
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
    fn test_virtual_interfaces_filtered() {
        assert!(is_virtual("lo"));
        assert!(is_virtual("veth01ab"));
        assert!(is_virtual("docker0"));
        assert!(is_virtual("br-4af1"));
        assert!(!is_virtual("eth0"));
        assert!(!is_virtual("wlan0"));
        assert!(!is_virtual("enp3s0"));
    }

    #[test]
    fn test_network_provider_samples() {
        let mut provider = NetworkProvider::new(Duration::from_millis(900)).unwrap();
        match provider.sample().unwrap() {
            Reading::Network(network) => {
                for iface in &network.interfaces {
                    assert!(!is_virtual(&iface.name));
                    assert!(iface.rx_bytes_per_sec >= 0.0);
                }
            }
            other => panic!("unexpected reading: {:?}", other.category()),
        }
    }
}
