//! Battery resolution: an ordered chain of probing strategies, each
//! independently fallible, stopping at the first validated reading.
//!
//! Order reflects decreasing reliability and availability in practice:
//! descriptive properties are cheapest and need no radio round-trip, the
//! power-report path rests on a heuristic identity match and is validated
//! numerically before trust, and the GATT read is the most expensive but
//! authoritative when it succeeds.

use btbat_platform::{
    LeBatterySource, Peripheral, PowerDevice, PowerReportSource, PropertyValue,
    BATTERY_PROPERTY_KEYS,
};
use btbat_protocol::BatterySource;
use tracing::debug;

/// One per-poll battery reading. Never cached across polls: battery state is
/// volatile and a stale reading is worse than "unavailable".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryReading {
    pub device_id: String,
    pub level: Option<u8>,
    pub source: Option<BatterySource>,
}

impl BatteryReading {
    fn absent(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            level: None,
            source: None,
        }
    }

    fn found(device_id: &str, level: u8, source: BatterySource) -> Self {
        Self {
            device_id: device_id.to_string(),
            level: Some(level),
            source: Some(source),
        }
    }
}

pub struct BatteryResolver<'a> {
    power: &'a dyn PowerReportSource,
    le: &'a dyn LeBatterySource,
}

impl<'a> BatteryResolver<'a> {
    pub fn new(power: &'a dyn PowerReportSource, le: &'a dyn LeBatterySource) -> Self {
        Self { power, le }
    }

    /// Resolves one peripheral. Disconnected devices are never probed —
    /// probing them wastes I/O and risks a platform-level fault.
    pub async fn resolve(&self, peripheral: &Peripheral) -> BatteryReading {
        if !peripheral.connected {
            return BatteryReading::absent(&peripheral.id);
        }

        if let Some(level) = from_properties(peripheral) {
            debug!(device = %peripheral.id, level, "battery level from properties");
            return BatteryReading::found(&peripheral.id, level, BatterySource::Properties);
        }

        if let Some(level) = self.from_power_report(peripheral).await {
            debug!(device = %peripheral.id, level, "battery level from power report");
            return BatteryReading::found(&peripheral.id, level, BatterySource::PowerReport);
        }

        if let Some(level) = self.from_gatt(peripheral).await {
            debug!(device = %peripheral.id, level, "battery level from gatt");
            return BatteryReading::found(&peripheral.id, level, BatterySource::Gatt);
        }

        debug!(device = %peripheral.id, "no battery info available");
        BatteryReading::absent(&peripheral.id)
    }

    async fn from_power_report(&self, peripheral: &Peripheral) -> Option<u8> {
        let entries = match self.power.power_devices().await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(device = %peripheral.id, error = %e, "power report probe failed");
                return None;
            }
        };

        entries
            .iter()
            .filter(|entry| correlates(peripheral, entry))
            .find_map(PowerDevice::percent)
    }

    async fn from_gatt(&self, peripheral: &Peripheral) -> Option<u8> {
        match self.le.read_battery_level(&peripheral.id).await {
            Ok(level) => level,
            Err(e) => {
                debug!(device = %peripheral.id, error = %e, "gatt probe failed");
                None
            }
        }
    }
}

/// First battery key present whose value validates as a percentage. Values
/// that parse but fall outside [0, 100], or fail to parse, are skipped.
fn from_properties(peripheral: &Peripheral) -> Option<u8> {
    BATTERY_PROPERTY_KEYS
        .iter()
        .find_map(|key| peripheral.property(key).and_then(PropertyValue::as_percent))
}

/// Heuristic link between a peripheral and a power-report entry: the
/// peripheral's native-id suffix appears in the entry id, or the entry name
/// contains the peripheral name case-insensitively.
///
/// Ambiguous when paired peripherals share name substrings — a reading can
/// be attributed to the wrong device. Kept as-is for parity with the
/// platform's own attribution; the subsequent capacity validation is the
/// only guard.
fn correlates(peripheral: &Peripheral, entry: &PowerDevice) -> bool {
    let suffix = peripheral.native_id_suffix();
    if !suffix.is_empty() && entry.id.contains(suffix) {
        return true;
    }

    !peripheral.name.is_empty()
        && entry
            .name
            .to_lowercase()
            .contains(&peripheral.name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use color_eyre::eyre::{eyre, Result};

    use super::*;

    #[derive(Default)]
    struct FakePower {
        entries: Vec<PowerDevice>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakePower {
        fn with(entries: Vec<PowerDevice>) -> Self {
            Self {
                entries,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PowerReportSource for FakePower {
        async fn power_devices(&self) -> Result<Vec<PowerDevice>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(eyre!("power enumeration fault"));
            }
            Ok(self.entries.clone())
        }
    }

    #[derive(Default)]
    struct FakeLe {
        level: Option<u8>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeLe {
        fn with(level: Option<u8>) -> Self {
            Self {
                level,
                ..Default::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl LeBatterySource for FakeLe {
        async fn is_le(&self, _device_id: &str) -> Result<bool> {
            Ok(self.level.is_some())
        }

        async fn read_battery_level(&self, _device_id: &str) -> Result<Option<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(eyre!("gatt fault"));
            }
            Ok(self.level)
        }
    }

    fn connected(id: &str, name: &str) -> Peripheral {
        Peripheral {
            id: id.to_string(),
            name: name.to_string(),
            connected: true,
            ..Default::default()
        }
    }

    fn power_entry(id: &str, name: &str, remaining: u32, full: u32) -> PowerDevice {
        PowerDevice {
            id: id.to_string(),
            name: name.to_string(),
            remaining_mwh: Some(remaining),
            full_charge_mwh: Some(full),
        }
    }

    #[tokio::test]
    async fn test_property_bag_accepts_valid_levels() {
        let power = FakePower::default();
        let le = FakeLe::default();
        let resolver = BatteryResolver::new(&power, &le);

        for n in [0i64, 1, 50, 99, 100] {
            let mut peripheral = connected("dev", "Headset");
            peripheral
                .properties
                .insert("battery.percentage".to_string(), PropertyValue::Int(n));

            let reading = resolver.resolve(&peripheral).await;
            assert_eq!(reading.level, Some(n as u8));
            assert_eq!(reading.source, Some(BatterySource::Properties));
        }
    }

    #[tokio::test]
    async fn test_out_of_range_property_falls_through() {
        let power = FakePower::default();
        let le = FakeLe::with(Some(42));
        let resolver = BatteryResolver::new(&power, &le);

        let mut peripheral = connected("dev", "Headset");
        peripheral
            .properties
            .insert("battery.percentage".to_string(), PropertyValue::Int(150));

        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, Some(42));
        assert_eq!(reading.source, Some(BatterySource::Gatt));
    }

    #[tokio::test]
    async fn test_later_synonym_key_is_consulted() {
        let power = FakePower::default();
        let le = FakeLe::default();
        let resolver = BatteryResolver::new(&power, &le);

        let mut peripheral = connected("dev", "Headset");
        peripheral.properties.insert(
            "hfp.battery_level".to_string(),
            PropertyValue::Text("60".to_string()),
        );

        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, Some(60));
        assert_eq!(reading.source, Some(BatterySource::Properties));
    }

    #[tokio::test]
    async fn test_property_bag_wins_over_power_report() {
        let power = FakePower::with(vec![power_entry("x", "Headset", 500, 1000)]);
        let le = FakeLe::default();
        let resolver = BatteryResolver::new(&power, &le);

        let mut peripheral = connected("dev", "Headset");
        peripheral
            .properties
            .insert("battery.level".to_string(), PropertyValue::Int(80));

        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, Some(80));
        assert_eq!(reading.source, Some(BatterySource::Properties));
        assert_eq!(power.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_power_report_matches_by_id_suffix() {
        let power = FakePower::with(vec![
            power_entry("unrelated", "Laptop Battery", 100, 1000),
            power_entry("hid-dev_AA_BB-battery", "", 750, 1000),
        ]);
        let le = FakeLe::default();
        let resolver = BatteryResolver::new(&power, &le);

        let peripheral = connected("/org/bluez/hci0/dev_AA_BB", "");
        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, Some(75));
        assert_eq!(reading.source, Some(BatterySource::PowerReport));
    }

    #[tokio::test]
    async fn test_power_report_matches_by_name_containment() {
        let power = FakePower::with(vec![power_entry("serial-1", "ACME KEYBOARD K1", 333, 1000)]);
        let le = FakeLe::default();
        let resolver = BatteryResolver::new(&power, &le);

        let peripheral = connected("dev", "keyboard k1");
        let reading = resolver.resolve(&peripheral).await;
        // 33.3% truncates to 33
        assert_eq!(reading.level, Some(33));
        assert_eq!(reading.source, Some(BatterySource::PowerReport));
    }

    #[tokio::test]
    async fn test_power_report_rejects_zero_full_charge() {
        let power = FakePower::with(vec![power_entry("serial-1", "Headset", 500, 0)]);
        let le = FakeLe::with(Some(55));
        let resolver = BatteryResolver::new(&power, &le);

        let peripheral = connected("dev", "Headset");
        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, Some(55));
        assert_eq!(reading.source, Some(BatterySource::Gatt));
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted_yields_absent() {
        let power = FakePower::default();
        let le = FakeLe::with(None);
        let resolver = BatteryResolver::new(&power, &le);

        let reading = resolver.resolve(&connected("dev", "Headset")).await;
        assert_eq!(reading.level, None);
        assert_eq!(reading.source, None);
    }

    #[tokio::test]
    async fn test_disconnected_device_is_never_probed() {
        let power = FakePower::failing();
        let le = FakeLe::failing();
        let resolver = BatteryResolver::new(&power, &le);

        let peripheral = Peripheral {
            id: "dev".to_string(),
            name: "Headset".to_string(),
            connected: false,
            ..Default::default()
        };

        let reading = resolver.resolve(&peripheral).await;
        assert_eq!(reading.level, None);
        assert_eq!(power.calls.load(Ordering::SeqCst), 0);
        assert_eq!(le.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_faulting_strategies_yield_absent_not_error() {
        let power = FakePower::failing();
        let le = FakeLe::failing();
        let resolver = BatteryResolver::new(&power, &le);

        let reading = resolver.resolve(&connected("dev", "Headset")).await;
        assert_eq!(reading.level, None);
        assert_eq!(power.calls.load(Ordering::SeqCst), 1);
        assert_eq!(le.calls.load(Ordering::SeqCst), 1);
    }
}
