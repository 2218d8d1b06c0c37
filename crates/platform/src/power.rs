//! System power-supply report.
//!
//! Wireless peripherals with HID battery reporting show up in the generic
//! power-supply list next to the laptop battery, which makes the list a
//! secondary, opportunistic source of peripheral charge levels.

use async_trait::async_trait;
use color_eyre::eyre::Result;
use starship_battery::units::energy::watt_hour;
use starship_battery::Manager;
use tracing::debug;

/// One entry of the platform's power-supply report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerDevice {
    /// Entry identifier (serial number or model, whichever is reported).
    pub id: String,
    /// Entry display name.
    pub name: String,
    pub remaining_mwh: Option<u32>,
    pub full_charge_mwh: Option<u32>,
}

impl PowerDevice {
    /// Charge percentage from capacity reporting, truncated to an integer.
    ///
    /// `None` when either capacity is missing or the full-charge value is
    /// zero; values computed outside [0, 100] are rejected as malformed.
    pub fn percent(&self) -> Option<u8> {
        let remaining = self.remaining_mwh?;
        let full = self.full_charge_mwh?;
        if full == 0 {
            return None;
        }
        let percent = remaining as u64 * 100 / full as u64;
        if percent <= 100 {
            Some(percent as u8)
        } else {
            None
        }
    }
}

/// Source of the system power-supply report.
#[async_trait]
pub trait PowerReportSource: Send + Sync {
    async fn power_devices(&self) -> Result<Vec<PowerDevice>>;
}

/// Power report backed by the OS power-supply enumeration.
pub struct SystemPowerReport;

impl SystemPowerReport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemPowerReport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerReportSource for SystemPowerReport {
    async fn power_devices(&self) -> Result<Vec<PowerDevice>> {
        let manager = Manager::new()?;
        let mut entries = Vec::new();

        for battery in manager.batteries()? {
            let battery = match battery {
                Ok(battery) => battery,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable power-supply entry");
                    continue;
                }
            };

            let id = battery
                .serial_number()
                .or_else(|| battery.model())
                .unwrap_or_default()
                .trim()
                .to_string();
            let name = battery
                .model()
                .or_else(|| battery.vendor())
                .unwrap_or_default()
                .trim()
                .to_string();

            entries.push(PowerDevice {
                id,
                name,
                remaining_mwh: Some((battery.energy().get::<watt_hour>() * 1000.0).round() as u32),
                full_charge_mwh: Some(
                    (battery.energy_full().get::<watt_hour>() * 1000.0).round() as u32,
                ),
            });
        }

        Ok(entries)
    }
}
