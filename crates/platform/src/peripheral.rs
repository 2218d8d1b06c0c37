//! Paired peripheral handles and their descriptive property bag.

use std::collections::BTreeMap;

use async_trait::async_trait;
use color_eyre::eyre::Result;

/// Known battery-percentage property keys, in probe order. The same reading
/// surfaces under different keys depending on device class, so all synonyms
/// are checked.
pub const BATTERY_PROPERTY_KEYS: &[&str] = &[
    "battery.percentage",
    "battery.level",
    "aep.battery_level",
    "hfp.battery_level",
];

/// Flag set when the device advertises as low-energy connectable.
pub const PROP_LE_CONNECTABLE: &str = "le.connectable";

/// Transport protocol identifier reported by the enumeration layer.
pub const PROP_PROTOCOL_ID: &str = "protocol_id";

/// A value from the enumeration layer's property bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl PropertyValue {
    /// Interprets the value as a battery percentage.
    ///
    /// Integers and numeric strings in [0, 100] are accepted; anything else
    /// (out of range, non-numeric, booleans) yields `None`.
    pub fn as_percent(&self) -> Option<u8> {
        let value = match self {
            PropertyValue::Int(value) => *value,
            PropertyValue::Text(text) => text.trim().parse::<i64>().ok()?,
            PropertyValue::Bool(_) => return None,
        };
        if (0..=100).contains(&value) {
            Some(value as u8)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One paired peripheral as enumerated this poll cycle.
///
/// A fresh set is fetched every cycle; only `id` is assumed stable across
/// polls.
#[derive(Debug, Clone, Default)]
pub struct Peripheral {
    /// Native identifier, e.g. a BlueZ object path.
    pub id: String,
    /// Name reported by the device itself.
    pub name: String,
    pub connected: bool,
    /// Raw class-of-device word, when the device reports one.
    pub class_of_device: Option<u32>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Peripheral {
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Trailing segment of the native identifier, used to correlate the
    /// peripheral with entries in the system power report.
    pub fn native_id_suffix(&self) -> &str {
        self.id.rsplit(['/', '#']).next().unwrap_or(&self.id)
    }
}

/// Source of the current paired-peripheral set.
#[async_trait]
pub trait PeripheralSource: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<Peripheral>>;
}
