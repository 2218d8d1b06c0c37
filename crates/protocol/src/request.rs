use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonRequest {
    GetDevices,
    GetStatus,
    GetSettings,
    SetEnabled {
        enabled: bool,
    },
    SetDefaultThreshold {
        threshold: u8,
    },
    SetDeviceThreshold {
        device_id: String,
        threshold: u8,
    },
    ClearDeviceThreshold {
        device_id: String,
    },
    SetSnoozeDuration {
        minutes: u32,
    },
    SnoozeDevice {
        device_id: String,
    },
    ClearSnooze {
        device_id: String,
    },
    /// An empty `name` clears the user-assigned override.
    RenameDevice {
        device_id: String,
        name: String,
    },
    Subscribe,
    Unsubscribe,
    Shutdown,
}

impl DaemonRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
