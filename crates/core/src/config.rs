use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sampler tick interval in milliseconds
    pub tick_ms: u64,

    /// Minimum interval between process table refreshes in milliseconds.
    /// Process enumeration is throttled independently because it is the
    /// most expensive provider on hosts with large process counts.
    pub process_min_interval_ms: u64,

    /// Per-provider reply deadline in milliseconds
    pub provider_timeout_ms: u64,

    /// Rolling history window capacity (samples per metric family)
    pub history_capacity: usize,

    /// Permission probe cache lifetime in seconds
    pub permission_refresh_secs: u64,

    /// Maximum device rows exposed through the wire document.
    /// The device registry itself is never truncated.
    pub device_display_cap: usize,

    /// Enable Linux procfs-backed counters (if built in)
    pub use_procfs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            process_min_interval_ms: 2000,
            provider_timeout_ms: 900,
            history_capacity: 60,
            permission_refresh_secs: 180,
            device_display_cap: 12,
            use_procfs: cfg!(feature = "linux_procfs"),
        }
    }
}

impl EngineConfig {
    /// Load configuration layered from defaults, an optional JSON file in
    /// the default locations, an explicit JSON file, and CLI overrides.
    pub fn load(cli: Option<&CliOverrides>, json_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(found) = Self::load_default_config()? {
            config = found;
        }

        if let Some(path) = json_path {
            config = Self::load_from_file(path)?;
        }

        if let Some(cli) = cli {
            config.apply_cli_overrides(cli);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific JSON file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            EngineError::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            EngineError::config(format!("failed to parse config file {}: {}", path.display(), e))
        })
    }

    fn load_default_config() -> Result<Option<Self>> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return Ok(Some(config)),
                    Err(e) => {
                        tracing::warn!("skipping config at {}: {}", path.display(), e);
                        continue;
                    }
                }
            }
        }

        Ok(None)
    }

    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("hostpulse").join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".hostpulse.json"));
        }

        paths.push(PathBuf::from("hostpulse.json"));

        paths
    }

    fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(tick) = cli.tick_ms {
            self.tick_ms = tick;
        }
        if let Some(capacity) = cli.history_capacity {
            self.history_capacity = capacity;
        }
        if let Some(timeout) = cli.provider_timeout_ms {
            self.provider_timeout_ms = timeout;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms < 50 {
            return Err(EngineError::config("tick interval must be at least 50ms"));
        }
        if self.tick_ms > 60_000 {
            return Err(EngineError::config("tick interval must be at most 60 seconds"));
        }
        if self.history_capacity == 0 {
            return Err(EngineError::config("history capacity must be non-zero"));
        }
        if self.provider_timeout_ms == 0 {
            return Err(EngineError::config("provider timeout must be non-zero"));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn process_min_interval(&self) -> Duration {
        Duration::from_millis(self.process_min_interval_ms)
    }

    pub fn permission_refresh(&self) -> Duration {
        Duration::from_secs(self.permission_refresh_secs)
    }
}

/// CLI overrides (temporary struct for CLI parsing)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub tick_ms: Option<u64>,
    pub history_capacity: Option<usize>,
    pub provider_timeout_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_ms, 1000);
        assert_eq!(config.process_min_interval_ms, 2000);
        assert_eq!(config.history_capacity, 60);
        assert_eq!(config.device_display_cap, 12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = EngineConfig::default();
        config.tick_ms = 10;
        assert!(config.validate().is_err());

        config.tick_ms = 1000;
        config.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = EngineConfig::default();
        config.apply_cli_overrides(&CliOverrides {
            tick_ms: Some(500),
            history_capacity: Some(120),
            provider_timeout_ms: None,
        });
        assert_eq!(config.tick_ms, 500);
        assert_eq!(config.history_capacity, 120);
        assert_eq!(config.provider_timeout_ms, 900);
    }
}
