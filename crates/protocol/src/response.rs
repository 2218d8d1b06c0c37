use serde::{Deserialize, Serialize};

use crate::types::{DaemonStatus, DeviceSnapshot, NotificationSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonResponse {
    Devices(Vec<DeviceSnapshot>),
    Settings(NotificationSettings),
    Status(DaemonStatus),
    Ok,
    Error(String),
    Subscribed,
    Unsubscribed,
    SubscriptionRejected { reason: String },
    /// Pushed to subscribers after every poll cycle.
    DeviceUpdate(Vec<DeviceSnapshot>),
}

impl DaemonResponse {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
