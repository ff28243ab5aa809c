use crate::error::Result;
use crate::model::SystemFacts;
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::{Duration, SystemTime};
use sysinfo::System;

/// Static system facts: hostname, OS identity, uptime.
pub struct SystemProvider {
    timeout: Duration,
}

impl SystemProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self { timeout })
    }
}

impl Provider for SystemProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::System
    }

    fn sample(&mut self) -> ProviderResult {
        let uptime = Duration::from_secs(System::uptime());

        Ok(Reading::System(SystemFacts {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os_name: System::name().unwrap_or_else(|| "unknown".to_string()),
            os_version: System::os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel_version: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            uptime,
            boot_time: SystemTime::now() - uptime,
        }))
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
