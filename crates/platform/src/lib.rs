//! Bluetooth peripheral enumeration and battery probes for btbat.
//!
//! This crate provides the collaborator traits the btbat core consumes —
//! a paired-peripheral source, the system power-supply report, and the GATT
//! battery probe — with platform-specific implementations behind features.
//!
//! # Features
//!
//! - `linux` - Enable Linux support (BlueZ D-Bus API via bluer)

mod gatt;
mod peripheral;
mod power;

pub use gatt::{LeBatterySource, BATTERY_LEVEL_UUID, BATTERY_SERVICE_UUID};
pub use peripheral::{
    Peripheral, PeripheralSource, PropertyValue, BATTERY_PROPERTY_KEYS, PROP_LE_CONNECTABLE,
    PROP_PROTOCOL_ID,
};
pub use power::{PowerDevice, PowerReportSource, SystemPowerReport};

#[cfg(target_os = "linux")]
#[cfg(feature = "linux")]
pub mod linux;
