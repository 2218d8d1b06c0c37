use std::collections::BTreeMap;

use async_trait::async_trait;
use bluer::{Adapter, Address, AddressType, Session};
use color_eyre::eyre::Result;
use tracing::debug;

use crate::gatt::{LeBatterySource, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
use crate::peripheral::{
    Peripheral, PeripheralSource, PropertyValue, PROP_LE_CONNECTABLE, PROP_PROTOCOL_ID,
};

/// Paired-device source backed by the default BlueZ adapter.
#[derive(Clone)]
pub struct BluezSource {
    adapter: Adapter,
}

impl BluezSource {
    pub async fn new() -> Result<Self> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        Ok(Self { adapter })
    }

    async fn peripheral_for(&self, address: Address) -> bluer::Result<Option<Peripheral>> {
        let device = self.adapter.device(address)?;
        if !device.is_paired().await? {
            return Ok(None);
        }

        let name = device.name().await?.unwrap_or_else(|| address.to_string());
        let connected = device.is_connected().await?;
        let class_of_device = device.class().await?;
        let address_type = device.address_type().await?;

        // Normalize BlueZ-side signals into the platform-neutral property
        // bag the resolver consumes.
        let mut properties = BTreeMap::new();
        if let Some(percentage) = device.battery_percentage().await? {
            properties.insert(
                "battery.percentage".to_string(),
                PropertyValue::Int(percentage as i64),
            );
        }
        properties.insert(
            PROP_LE_CONNECTABLE.to_string(),
            PropertyValue::Bool(matches!(
                address_type,
                AddressType::LePublic | AddressType::LeRandom
            )),
        );
        properties.insert(
            PROP_PROTOCOL_ID.to_string(),
            PropertyValue::Text("bluetooth".to_string()),
        );

        Ok(Some(Peripheral {
            id: object_path(self.adapter.name(), address),
            name,
            connected,
            class_of_device,
            properties,
        }))
    }
}

#[async_trait]
impl PeripheralSource for BluezSource {
    async fn enumerate(&self) -> Result<Vec<Peripheral>> {
        let mut peripherals = Vec::new();
        for address in self.adapter.device_addresses().await? {
            match self.peripheral_for(address).await {
                Ok(Some(peripheral)) => peripherals.push(peripheral),
                Ok(None) => {}
                Err(e) => {
                    debug!(%address, error = %e, "skipping unreadable device");
                }
            }
        }
        Ok(peripherals)
    }
}

#[async_trait]
impl LeBatterySource for BluezSource {
    async fn is_le(&self, device_id: &str) -> Result<bool> {
        let device = self.adapter.device(address_from_id(device_id)?)?;
        Ok(matches!(
            device.address_type().await?,
            AddressType::LePublic | AddressType::LeRandom
        ))
    }

    async fn read_battery_level(&self, device_id: &str) -> Result<Option<u8>> {
        let device = self.adapter.device(address_from_id(device_id)?)?;

        // Service and characteristic proxies drop at scope exit; nothing
        // radio-facing is held past the read.
        for service in device.services().await? {
            if service.uuid().await? != BATTERY_SERVICE_UUID {
                continue;
            }
            for characteristic in service.characteristics().await? {
                if characteristic.uuid().await? != BATTERY_LEVEL_UUID {
                    continue;
                }
                let value = characteristic.read().await?;
                return Ok(value.first().copied().filter(|level| *level <= 100));
            }
        }

        Ok(None)
    }
}

fn object_path(adapter_name: &str, address: Address) -> String {
    format!(
        "/org/bluez/{}/dev_{}",
        adapter_name,
        address.to_string().replace(':', "_")
    )
}

fn address_from_id(device_id: &str) -> Result<Address> {
    let tail = device_id.rsplit('/').next().unwrap_or(device_id);
    let address = tail.strip_prefix("dev_").unwrap_or(tail).replace('_', ":");
    Ok(address.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_round_trips_through_address_from_id() {
        let address: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let id = object_path("hci0", address);
        assert_eq!(id, "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF");
        assert_eq!(address_from_id(&id).unwrap(), address);
    }

    #[test]
    fn test_address_from_id_accepts_bare_address() {
        let address = address_from_id("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(address.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_address_from_id_rejects_garbage() {
        assert!(address_from_id("/org/bluez/hci0/not-an-address").is_err());
    }
}
