mod request;
mod response;
mod types;
mod version;

pub use request::DaemonRequest;
pub use response::DaemonResponse;
pub use types::{
    BatterySource, DaemonStatus, DeviceKind, DeviceSnapshot, NotificationSettings,
    MAX_SUBSCRIBERS, SNOOZE_MINUTES_RANGE, THRESHOLD_RANGE,
};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
