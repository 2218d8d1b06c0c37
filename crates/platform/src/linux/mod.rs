//! Linux implementations backed by the BlueZ D-Bus API.

mod bluetooth;

pub use bluetooth::BluezSource;
