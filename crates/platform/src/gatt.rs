//! Standard GATT battery service identifiers and the low-energy probe trait.

use async_trait::async_trait;
use color_eyre::eyre::Result;
use uuid::{uuid, Uuid};

/// Battery service (0x180F).
pub const BATTERY_SERVICE_UUID: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic (0x2A19).
pub const BATTERY_LEVEL_UUID: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Probe a peripheral under the low-energy profile.
///
/// Implementations must release any profile, service, or characteristic
/// handle before returning, on every exit path.
#[async_trait]
pub trait LeBatterySource: Send + Sync {
    /// Whether the device answers under the low-energy profile at all.
    async fn is_le(&self, device_id: &str) -> Result<bool>;

    /// Discover the battery service and read its level characteristic.
    ///
    /// `Ok(None)` means the device has no battery service, no level
    /// characteristic, or reported an out-of-range value; `Err` covers
    /// transport faults. Callers treat both as "no reading".
    async fn read_battery_level(&self, device_id: &str) -> Result<Option<u8>>;
}
