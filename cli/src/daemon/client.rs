use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use btbat_protocol::{
    DaemonRequest, DaemonResponse, DaemonStatus, DeviceSnapshot, NotificationSettings,
    MIN_SUPPORTED_VERSION, PROTOCOL_VERSION,
};

use crate::daemon::socket_path;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error(
        "Protocol version mismatch: daemon (v{daemon_version}) speaks protocol \
         v{daemon_protocol}, this build requires v{min_supported}+. \
         Restart the daemon: btbat daemon stop && btbat daemon start"
    )]
    VersionMismatch {
        daemon_version: String,
        daemon_protocol: u32,
        min_supported: u32,
    },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// N-1 compatibility: both sides must speak a version the other supports.
pub fn check_version_compatibility(status: &DaemonStatus) -> Result<()> {
    if PROTOCOL_VERSION < status.min_supported_version
        || status.protocol_version < MIN_SUPPORTED_VERSION
    {
        return Err(ClientError::VersionMismatch {
            daemon_version: status.version.clone(),
            daemon_protocol: status.protocol_version,
            min_supported: MIN_SUPPORTED_VERSION,
        });
    }
    Ok(())
}

pub struct DaemonClient {
    stream: UnixStream,
    read_buffer: Vec<u8>,
}

impl DaemonClient {
    pub fn connect() -> Result<Self> {
        let stream = UnixStream::connect(socket_path())?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(16 * 1024),
        })
    }

    /// Connects and validates protocol compatibility in one step.
    pub fn connect_with_version_check() -> Result<Self> {
        let mut client = Self::connect()?;
        let status = client.get_status()?;
        check_version_compatibility(&status)?;
        Ok(client)
    }

    fn read_line(&mut self) -> Result<String> {
        let mut temp_buf = [0u8; 8192];
        loop {
            if let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.read_buffer.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line_bytes).to_string());
            }
            let n = self.stream.read(&mut temp_buf)?;
            if n == 0 {
                return Err(ClientError::Protocol("Connection closed".into()));
            }
            self.read_buffer.extend_from_slice(&temp_buf[..n]);
        }
    }

    fn send_request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        let json = request
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        writeln!(self.stream, "{}", json)?;
        self.stream.flush()?;

        let line = self.read_line()?;
        DaemonResponse::from_json(&line).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn expect_ok(&mut self, request: DaemonRequest) -> Result<()> {
        match self.send_request(request)? {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
            _ => Err(ClientError::Protocol("Unexpected response".into())),
        }
    }

    pub fn get_status(&mut self) -> Result<DaemonStatus> {
        match self.send_request(DaemonRequest::GetStatus)? {
            DaemonResponse::Status(status) => Ok(status),
            DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
            _ => Err(ClientError::Protocol("Unexpected response".into())),
        }
    }

    pub fn get_devices(&mut self) -> Result<Vec<DeviceSnapshot>> {
        match self.send_request(DaemonRequest::GetDevices)? {
            DaemonResponse::Devices(devices) => Ok(devices),
            DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
            _ => Err(ClientError::Protocol("Unexpected response".into())),
        }
    }

    pub fn get_settings(&mut self) -> Result<NotificationSettings> {
        match self.send_request(DaemonRequest::GetSettings)? {
            DaemonResponse::Settings(settings) => Ok(settings),
            DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
            _ => Err(ClientError::Protocol("Unexpected response".into())),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.expect_ok(DaemonRequest::SetEnabled { enabled })
    }

    pub fn set_default_threshold(&mut self, threshold: u8) -> Result<()> {
        self.expect_ok(DaemonRequest::SetDefaultThreshold { threshold })
    }

    pub fn set_device_threshold(&mut self, device_id: &str, threshold: u8) -> Result<()> {
        self.expect_ok(DaemonRequest::SetDeviceThreshold {
            device_id: device_id.to_string(),
            threshold,
        })
    }

    pub fn clear_device_threshold(&mut self, device_id: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::ClearDeviceThreshold {
            device_id: device_id.to_string(),
        })
    }

    pub fn set_snooze_duration(&mut self, minutes: u32) -> Result<()> {
        self.expect_ok(DaemonRequest::SetSnoozeDuration { minutes })
    }

    pub fn snooze_device(&mut self, device_id: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::SnoozeDevice {
            device_id: device_id.to_string(),
        })
    }

    pub fn clear_snooze(&mut self, device_id: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::ClearSnooze {
            device_id: device_id.to_string(),
        })
    }

    pub fn rename_device(&mut self, device_id: &str, name: &str) -> Result<()> {
        self.expect_ok(DaemonRequest::RenameDevice {
            device_id: device_id.to_string(),
            name: name.to_string(),
        })
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.expect_ok(DaemonRequest::Shutdown)
    }

    pub fn subscribe(&mut self) -> Result<()> {
        match self.send_request(DaemonRequest::Subscribe)? {
            DaemonResponse::Subscribed => Ok(()),
            DaemonResponse::SubscriptionRejected { reason } => {
                Err(ClientError::SubscriptionRejected(reason))
            }
            DaemonResponse::Error(e) => Err(ClientError::Daemon(e)),
            _ => Err(ClientError::Protocol("Unexpected response".into())),
        }
    }

    /// Blocks until the next pushed device list. Used by `devices --watch`,
    /// so no read timeout: updates arrive once per poll cycle.
    pub fn next_update(&mut self) -> Result<Vec<DeviceSnapshot>> {
        self.stream.set_read_timeout(None)?;
        loop {
            let line = self.read_line()?;
            match DaemonResponse::from_json(&line)
                .map_err(|e| ClientError::Protocol(e.to_string()))?
            {
                DaemonResponse::DeviceUpdate(devices) => return Ok(devices),
                DaemonResponse::Error(e) => return Err(ClientError::Daemon(e)),
                _ => {}
            }
        }
    }
}
