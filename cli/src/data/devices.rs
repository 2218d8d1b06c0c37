//! Snapshot assembly: one immutable device list per poll cycle.

use btbat_platform::{LeBatterySource, Peripheral, PeripheralSource, PowerReportSource};
use btbat_protocol::{BatterySource, DeviceSnapshot};
use futures::future::join_all;
use tracing::error;

use crate::data::classify::{kind_for_class, protocol_label};
use crate::data::resolver::BatteryResolver;
use crate::store::NameStore;

pub struct DeviceData {
    source: Box<dyn PeripheralSource>,
    power: Box<dyn PowerReportSource>,
    le: Box<dyn LeBatterySource>,
}

impl DeviceData {
    pub fn new(
        source: Box<dyn PeripheralSource>,
        power: Box<dyn PowerReportSource>,
        le: Box<dyn LeBatterySource>,
    ) -> Self {
        Self { source, power, le }
    }

    /// Probes backed by the default Bluetooth adapter and the system power
    /// report.
    #[cfg(all(target_os = "linux", feature = "linux"))]
    pub async fn with_system_probes() -> color_eyre::eyre::Result<Self> {
        let bluez = btbat_platform::linux::BluezSource::new().await?;
        Ok(Self::new(
            Box::new(bluez.clone()),
            Box::new(btbat_platform::SystemPowerReport::new()),
            Box::new(bluez),
        ))
    }

    /// Enumerates the current peripheral set and assembles one snapshot per
    /// device. Devices resolve concurrently; a fault in one probe yields an
    /// absent reading for that device only. An enumeration failure yields an
    /// empty list, never an error.
    pub async fn refresh(&self, names: &NameStore) -> Vec<DeviceSnapshot> {
        let peripherals = match self.source.enumerate().await {
            Ok(peripherals) => peripherals,
            Err(e) => {
                error!(error = %e, "device enumeration failed");
                return Vec::new();
            }
        };

        let resolver = BatteryResolver::new(self.power.as_ref(), self.le.as_ref());
        let mut snapshots = join_all(
            peripherals
                .iter()
                .map(|peripheral| self.snapshot_for(&resolver, peripheral, names)),
        )
        .await;

        snapshots.sort_by(|a, b| {
            b.connected
                .cmp(&a.connected)
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
        snapshots
    }

    async fn snapshot_for(
        &self,
        resolver: &BatteryResolver<'_>,
        peripheral: &Peripheral,
        names: &NameStore,
    ) -> DeviceSnapshot {
        let reading = resolver.resolve(peripheral).await;

        // A successful GATT read already proves the device answers as LE;
        // otherwise ask the profile directly, but never for disconnected
        // devices.
        let answers_le = reading.source == Some(BatterySource::Gatt)
            || (peripheral.connected && self.le.is_le(&peripheral.id).await.unwrap_or(false));

        DeviceSnapshot {
            id: peripheral.id.clone(),
            display_name: names.display_name(&peripheral.id, &peripheral.name),
            kind: kind_for_class(peripheral.class_of_device),
            connected: peripheral.connected,
            battery_percent: reading.level,
            battery_source: reading.source,
            protocol_label: Some(protocol_label(peripheral, answers_le)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use btbat_platform::{PowerDevice, PropertyValue};
    use btbat_protocol::DeviceKind;
    use color_eyre::eyre::{eyre, Result};

    use super::*;

    struct FakeSource(Vec<Peripheral>);

    #[async_trait]
    impl PeripheralSource for FakeSource {
        async fn enumerate(&self) -> Result<Vec<Peripheral>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl PeripheralSource for FailingSource {
        async fn enumerate(&self) -> Result<Vec<Peripheral>> {
            Err(eyre!("adapter gone"))
        }
    }

    struct NoPower;

    #[async_trait]
    impl PowerReportSource for NoPower {
        async fn power_devices(&self) -> Result<Vec<PowerDevice>> {
            Ok(Vec::new())
        }
    }

    /// Faults for one device id, answers for the rest.
    struct SelectiveLe {
        faulting_id: String,
        level: u8,
    }

    #[async_trait]
    impl LeBatterySource for SelectiveLe {
        async fn is_le(&self, _device_id: &str) -> Result<bool> {
            Ok(true)
        }

        async fn read_battery_level(&self, device_id: &str) -> Result<Option<u8>> {
            if device_id == self.faulting_id {
                return Err(eyre!("transport fault"));
            }
            Ok(Some(self.level))
        }
    }

    fn names() -> NameStore {
        NameStore::open(PathBuf::from("/nonexistent/btbat-names.json"))
    }

    fn peripheral(id: &str, name: &str, connected: bool) -> Peripheral {
        Peripheral {
            id: id.to_string(),
            name: name.to_string(),
            connected,
            class_of_device: Some(0x000580),
            properties: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_faulting_device_does_not_abort_the_rest() {
        let source = FakeSource(vec![
            peripheral("a", "Mouse A", true),
            peripheral("b", "Mouse B", true),
            peripheral("c", "Mouse C", true),
        ]);
        let data = DeviceData::new(
            Box::new(source),
            Box::new(NoPower),
            Box::new(SelectiveLe {
                faulting_id: "b".to_string(),
                level: 64,
            }),
        );

        let snapshots = data.refresh(&names()).await;
        assert_eq!(snapshots.len(), 3);

        let by_id = |id: &str| snapshots.iter().find(|s| s.id == id).unwrap();
        assert_eq!(by_id("a").battery_percent, Some(64));
        assert_eq!(by_id("b").battery_percent, None);
        assert_eq!(by_id("c").battery_percent, Some(64));
    }

    #[tokio::test]
    async fn test_enumeration_failure_yields_empty_list() {
        let data = DeviceData::new(
            Box::new(FailingSource),
            Box::new(NoPower),
            Box::new(SelectiveLe {
                faulting_id: String::new(),
                level: 50,
            }),
        );

        assert!(data.refresh(&names()).await.is_empty());
    }

    #[tokio::test]
    async fn test_connected_devices_sort_first() {
        let source = FakeSource(vec![
            peripheral("a", "Zeta", false),
            peripheral("b", "Alpha", true),
            peripheral("c", "Beta", false),
        ]);
        let data = DeviceData::new(
            Box::new(source),
            Box::new(NoPower),
            Box::new(SelectiveLe {
                faulting_id: String::new(),
                level: 50,
            }),
        );

        let snapshots = data.refresh(&names()).await;
        let order: Vec<&str> = snapshots.iter().map(|s| s.display_name.as_str()).collect();
        assert_eq!(order, vec!["Alpha", "Beta", "Zeta"]);
    }

    #[tokio::test]
    async fn test_snapshot_carries_kind_and_label() {
        let mut connected = peripheral("a", "Keys", true);
        connected.properties.insert(
            "battery.percentage".to_string(),
            PropertyValue::Int(88),
        );
        let data = DeviceData::new(
            Box::new(FakeSource(vec![connected])),
            Box::new(NoPower),
            Box::new(SelectiveLe {
                faulting_id: String::new(),
                level: 50,
            }),
        );

        let snapshots = data.refresh(&names()).await;
        assert_eq!(snapshots[0].kind, DeviceKind::Peripheral);
        assert_eq!(snapshots[0].battery_percent, Some(88));
        assert_eq!(
            snapshots[0].protocol_label.as_deref(),
            Some(crate::data::classify::LABEL_BLE)
        );
    }
}
