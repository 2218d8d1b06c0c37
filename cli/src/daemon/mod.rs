mod client;
mod server;

pub use client::{ClientError, DaemonClient};
pub use server::run_daemon;
#[allow(unused_imports)]
pub use server::DaemonError;

use std::path::PathBuf;

use crate::config::runtime_dir;

const SOCKET_NAME: &str = "btbat.sock";

pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_NAME)
}

pub fn is_daemon_running() -> bool {
    DaemonClient::connect().is_ok()
}

/// Most recent daily log file written by the rolling appender, if any.
pub fn latest_log_path() -> Option<PathBuf> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(runtime_dir())
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("btbat.") && name.ends_with(".log"))
        })
        .collect();
    logs.sort();
    logs.pop()
}
