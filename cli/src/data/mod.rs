pub mod classify;
pub mod devices;
pub mod notify;
pub mod resolver;
pub mod sink;

pub use devices::DeviceData;
pub use notify::{AlertEvent, NotificationEngine};
pub use sink::{spawn_delivery_task, DesktopSink, NotificationSink};
