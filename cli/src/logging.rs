use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{runtime_dir, LogLevel};

static INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    File,
    Stderr,
    Both,
}

pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub fn init(level: LogLevel, mode: LogMode, cli_override: Option<LogLevel>) -> LogGuard {
    let mut guard = None;

    INIT.get_or_init(|| {
        let effective_level = cli_override.unwrap_or(level);

        let Some(tracing_level) = effective_level.as_tracing_level() else {
            return;
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();

        if matches!(mode, LogMode::File | LogMode::Both) {
            let (layer, file_guard) = file_layer(tracing_level);
            layers.extend(layer);
            guard = file_guard;
        }
        if matches!(mode, LogMode::Stderr | LogMode::Both) {
            layers.push(stderr_layer(tracing_level));
        }

        tracing_subscriber::registry().with(layers).init();
    });

    LogGuard { _guard: guard }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
        .add_directive("bluer=warn".parse().unwrap())
        .add_directive("dbus=warn".parse().unwrap())
        .add_directive("notify_rust=warn".parse().unwrap())
}

fn stderr_layer(level: Level) -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(true)
        .with_target(true)
        .with_filter(env_filter(level))
        .boxed()
}

fn file_layer(level: Level) -> (Option<BoxedLayer>, Option<WorkerGuard>) {
    let log_dir = runtime_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_dir, e
        );
        return (None, None);
    }

    let Ok(appender) = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("btbat")
        .filename_suffix("log")
        .max_log_files(7)
        .build(&log_dir)
    else {
        return (None, None);
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(UtcTime::rfc_3339())
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter(level))
        .boxed();

    (Some(layer), Some(guard))
}
