use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};

/// Coarse device category derived from the Bluetooth class-of-device word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    AudioVideo,
    Computer,
    Phone,
    Peripheral,
    #[default]
    Unknown,
}

impl DeviceKind {
    /// Returns a human-readable label for the device kind.
    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::AudioVideo => "Audio",
            DeviceKind::Computer => "Computer",
            DeviceKind::Phone => "Phone",
            DeviceKind::Peripheral => "Peripheral",
            DeviceKind::Unknown => "Unknown",
        }
    }

    /// Icon name used by UI clients.
    pub fn icon(&self) -> &'static str {
        match self {
            DeviceKind::AudioVideo => "headphones",
            DeviceKind::Computer => "monitor",
            DeviceKind::Phone => "smartphone",
            DeviceKind::Peripheral => "mouse",
            DeviceKind::Unknown => "bluetooth",
        }
    }

    /// Emoji used in notification titles.
    pub fn emoji(&self) -> &'static str {
        match self {
            DeviceKind::AudioVideo => "\u{1f3a7}",
            DeviceKind::Computer => "\u{1f5a5}\u{fe0f}",
            DeviceKind::Phone => "\u{1f4f1}",
            DeviceKind::Peripheral => "\u{1f5b1}\u{fe0f}",
            DeviceKind::Unknown => "\u{1f4f6}",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which probing strategy produced a battery reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatterySource {
    /// Descriptive property bag of the enumeration layer.
    Properties,
    /// Correlated entry in the system power-supply report.
    PowerReport,
    /// GATT battery service characteristic read.
    Gatt,
}

impl BatterySource {
    pub fn label(&self) -> &'static str {
        match self {
            BatterySource::Properties => "properties",
            BatterySource::PowerReport => "power report",
            BatterySource::Gatt => "gatt",
        }
    }
}

/// Per-poll view of one paired peripheral.
///
/// `battery_percent` is `None` when no probing strategy produced a validated
/// reading; "unavailable" is a first-class value distinct from 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeviceSnapshot {
    pub id: String,
    pub display_name: String,
    pub kind: DeviceKind,
    pub connected: bool,
    pub battery_percent: Option<u8>,
    pub battery_source: Option<BatterySource>,
    pub protocol_label: Option<String>,
}

/// Valid range for low-battery thresholds (percent), inclusive.
pub const THRESHOLD_RANGE: RangeInclusive<u8> = 5..=50;

/// Valid range for the snooze window (minutes), inclusive.
pub const SNOOZE_MINUTES_RANGE: RangeInclusive<u32> = 5..=120;

/// User-facing alerting policy.
///
/// Setters on the engine clamp numeric values into [`THRESHOLD_RANGE`] /
/// [`SNOOZE_MINUTES_RANGE`] instead of rejecting them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub default_threshold: u8,
    pub device_thresholds: BTreeMap<String, u8>,
    pub snooze_duration_mins: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_threshold: 20,
            device_thresholds: BTreeMap::new(),
            snooze_duration_mins: 30,
        }
    }
}

impl NotificationSettings {
    /// Per-device override when set, else the global default.
    pub fn threshold_for(&self, device_id: &str) -> u8 {
        self.device_thresholds
            .get(device_id)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub device_count: usize,
    pub connected_count: usize,
    pub last_poll_time: Option<i64>,
    pub poll_interval_secs: u64,
    pub notifications_enabled: bool,
    pub version: String,
    pub subscriber_count: usize,
    pub protocol_version: u32,
    pub min_supported_version: u32,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            running: false,
            uptime_secs: 0,
            device_count: 0,
            connected_count: 0,
            last_poll_time: None,
            poll_interval_secs: 0,
            notifications_enabled: false,
            version: String::new(),
            subscriber_count: 0,
            protocol_version: PROTOCOL_VERSION,
            min_supported_version: MIN_SUPPORTED_VERSION,
        }
    }
}

pub const MAX_SUBSCRIBERS: usize = 10;
