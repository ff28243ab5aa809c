use crate::error::Result;
use crate::model::{BatteryStatus, FanReading, PowerReading, SensorReadings, TemperatureReading};
use crate::providers::{Provider, ProviderCategory, ProviderResult, Reading};
use std::time::Duration;
use sysinfo::Components;

#[cfg(target_os = "linux")]
use std::fs;
#[cfg(target_os = "linux")]
use std::path::Path;

/// Temperature, fan, power and battery sensors. Temperatures come from
/// sysinfo components; fans and power supplies are read from sysfs on
/// Linux, where sysinfo does not expose them.
pub struct SensorProvider {
    components: Components,
    timeout: Duration,
}

impl SensorProvider {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            components: Components::new_with_refreshed_list(),
            timeout,
        })
    }

    fn temperatures(&mut self) -> Vec<TemperatureReading> {
        self.components.refresh();

        let mut readings = Vec::new();
        for component in &self.components {
            let celsius = component.temperature();
            if celsius <= 0.0 {
                continue;
            }
            readings.push(TemperatureReading {
                source: "hwmon".to_string(),
                label: component.label().to_string(),
                celsius,
                critical: component.critical(),
            });
        }
        readings
    }

    #[cfg(target_os = "linux")]
    fn fans() -> Vec<FanReading> {
        let mut readings = Vec::new();
        let hwmon = Path::new("/sys/class/hwmon");
        let Ok(entries) = fs::read_dir(hwmon) else {
            return readings;
        };

        for entry in entries.flatten() {
            let dir = entry.path();
            let chip = fs::read_to_string(dir.join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "hwmon".to_string());

            for index in 1..=8 {
                let input = dir.join(format!("fan{}_input", index));
                let Ok(raw) = fs::read_to_string(&input) else {
                    continue;
                };
                let Ok(rpm) = raw.trim().parse::<u32>() else {
                    continue;
                };
                let label = fs::read_to_string(dir.join(format!("fan{}_label", index)))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| format!("fan{}", index));
                readings.push(FanReading {
                    source: chip.clone(),
                    label,
                    rpm,
                });
            }
        }
        readings
    }

    #[cfg(not(target_os = "linux"))]
    fn fans() -> Vec<FanReading> {
        Vec::new()
    }

    #[cfg(target_os = "linux")]
    fn power_and_battery() -> (Vec<PowerReading>, Option<BatteryStatus>) {
        let mut power = Vec::new();
        let mut battery = None;
        let supplies = Path::new("/sys/class/power_supply");
        let Ok(entries) = fs::read_dir(supplies) else {
            return (power, battery);
        };

        let mut on_ac = false;
        for entry in entries.flatten() {
            let dir = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let kind = fs::read_to_string(dir.join("type"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();

            match kind.as_str() {
                "Mains" => {
                    if let Ok(online) = fs::read_to_string(dir.join("online")) {
                        on_ac = on_ac || online.trim() == "1";
                    }
                }
                "Battery" => {
                    let percent = fs::read_to_string(dir.join("capacity"))
                        .ok()
                        .and_then(|s| s.trim().parse::<f32>().ok())
                        .unwrap_or(0.0);
                    let state = fs::read_to_string(dir.join("status"))
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| "Unknown".to_string());
                    // power_now is in microwatts.
                    if let Some(micro) = fs::read_to_string(dir.join("power_now"))
                        .ok()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                    {
                        power.push(PowerReading {
                            source: name,
                            watts: micro / 1e6,
                        });
                    }
                    battery = Some(BatteryStatus {
                        percent,
                        on_ac: false,
                        state,
                    });
                }
                _ => {}
            }
        }

        if let Some(ref mut status) = battery {
            status.on_ac = on_ac;
        }
        (power, battery)
    }

    #[cfg(not(target_os = "linux"))]
    fn power_and_battery() -> (Vec<PowerReading>, Option<BatteryStatus>) {
        (Vec::new(), None)
    }
}

impl Provider for SensorProvider {
    fn category(&self) -> ProviderCategory {
        ProviderCategory::Sensors
    }

    fn sample(&mut self) -> ProviderResult {
        let temperatures = self.temperatures();
        let fans = Self::fans();
        let (power, battery) = Self::power_and_battery();

        Ok(Reading::Sensors(SensorReadings {
            temperatures,
            fans,
            power,
            battery,
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
    fn test_sensor_provider_never_fails() {
        // Sensors are often absent (VMs, containers); the reading must
        // still be Ok with empty groups, never an error.
        let mut provider = SensorProvider::new(Duration::from_millis(900)).unwrap();
        match provider.sample().unwrap() {
            Reading::Sensors(sensors) => {
                for reading in &sensors.temperatures {
                    assert!(reading.celsius > 0.0);
                }
            }
            other => panic!("unexpected reading: {:?}", other.category()),
        }
    }
}
