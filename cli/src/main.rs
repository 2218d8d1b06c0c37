mod config;
mod daemon;
mod data;
mod logging;
mod store;

use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};

use btbat_protocol::{DeviceSnapshot, NotificationSettings};
use config::{config_path, ensure_dirs, LogLevel, UserConfig};
use daemon::{is_daemon_running, latest_log_path, run_daemon, socket_path, ClientError, DaemonClient};
use data::DeviceData;
use logging::LogMode;
use store::{names_path, settings_path, NameStore, SettingsStore};

#[derive(Debug, Subcommand)]
enum Commands {
    /// List paired devices and their battery levels (default)
    #[command(alias = "ls")]
    Devices {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,

        /// Keep the connection open and print every poll update
        #[arg(short, long)]
        watch: bool,
    },

    /// Show or change notification settings
    Settings {
        #[command(subcommand)]
        command: Option<SettingsCommands>,
    },

    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },

    /// Show or edit configuration
    Config {
        /// Print config file path
        #[arg(long)]
        path: bool,

        /// Reset config to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(short, long)]
        edit: bool,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommands {
    /// Show current notification settings (default)
    Show,

    /// Enable low-battery notifications
    Enable,

    /// Disable low-battery notifications
    Disable,

    /// Set the default low-battery threshold (5-50 percent)
    Threshold {
        percent: u8,
    },

    /// Set a per-device threshold override (5-50 percent)
    DeviceThreshold {
        device_id: String,
        percent: u8,
    },

    /// Remove a per-device threshold override
    ClearDeviceThreshold {
        device_id: String,
    },

    /// Set the snooze window between repeat alerts (5-120 minutes)
    SnoozeDuration {
        minutes: u32,
    },

    /// Snooze alerts for a device starting now
    Snooze {
        device_id: String,
    },

    /// Clear an active snooze so the next qualifying poll alerts
    ClearSnooze {
        device_id: String,
    },

    /// Assign a custom display name (empty name clears the override)
    Rename {
        device_id: String,
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum DaemonCommands {
    /// Start the daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Check daemon status
    Status,

    /// View daemon logs
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value_t = 50)]
        lines: usize,
    },
}

/// Battery monitor and low-battery notifier for paired Bluetooth peripherals
#[derive(Debug, Parser)]
#[command(name = "btbat", version, verbatim_doc_comment)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = UserConfig::load();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::from_str);

    match cli.command {
        Some(Commands::Devices { json, watch }) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            run_devices(json, watch)
        }
        Some(Commands::Settings { command }) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            run_settings(command.unwrap_or(SettingsCommands::Show))
        }
        Some(Commands::Daemon { command }) => {
            run_daemon_command(command, config.log_level, log_level_override)
        }
        Some(Commands::Config { path, reset, edit }) => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            run_config(path, reset, edit)
        }
        None => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            run_devices(false, false)
        }
    }
}

fn run_devices(json: bool, watch: bool) -> Result<()> {
    if watch {
        let mut client =
            DaemonClient::connect_with_version_check().map_err(|e| eyre!("{}", e))?;
        client.subscribe().map_err(|e| eyre!("{}", e))?;
        loop {
            let devices = client.next_update().map_err(|e| eyre!("{}", e))?;
            print_devices(&devices, json)?;
        }
    }

    let devices = match DaemonClient::connect_with_version_check() {
        Ok(mut client) => client.get_devices().map_err(|e| eyre!("{}", e))?,
        // No daemon: fall back to a one-shot local scan.
        Err(ClientError::Connection(_)) => local_scan()?,
        Err(e) => return Err(eyre!("{}", e)),
    };

    print_devices(&devices, json)
}

fn local_scan() -> Result<Vec<DeviceSnapshot>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let data = DeviceData::with_system_probes().await?;
        let names = NameStore::open(names_path());
        Ok(data.refresh(&names).await)
    })
}

fn print_devices(devices: &[DeviceSnapshot], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No paired Bluetooth devices found.");
        return Ok(());
    }

    println!(
        "{:<28} {:<11} {:<10} {:<9} Protocol",
        "Name", "Kind", "Connected", "Battery"
    );
    println!("{}", "-".repeat(72));
    for device in devices {
        let battery = device
            .battery_percent
            .map(|level| format!("{}%", level))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<28} {:<11} {:<10} {:<9} {}",
            truncate_str(&device.display_name, 26),
            device.kind.label(),
            if device.connected { "yes" } else { "no" },
            battery,
            device.protocol_label.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

fn run_settings(command: SettingsCommands) -> Result<()> {
    if let SettingsCommands::Show = command {
        // Prefer the daemon's live copy, fall back to the on-disk store.
        let settings = match DaemonClient::connect() {
            Ok(mut client) => client.get_settings().map_err(|e| eyre!("{}", e))?,
            Err(_) => SettingsStore::open(settings_path()).load(),
        };
        print_settings(&settings);
        return Ok(());
    }

    let mut client = match DaemonClient::connect_with_version_check() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Daemon is not running ({}).", e);
            eprintln!("Start it with: btbat daemon start");
            std::process::exit(1);
        }
    };

    let result = match command {
        SettingsCommands::Show => unreachable!("handled above"),
        SettingsCommands::Enable => client.set_enabled(true),
        SettingsCommands::Disable => client.set_enabled(false),
        SettingsCommands::Threshold { percent } => client.set_default_threshold(percent),
        SettingsCommands::DeviceThreshold { device_id, percent } => {
            client.set_device_threshold(&device_id, percent)
        }
        SettingsCommands::ClearDeviceThreshold { device_id } => {
            client.clear_device_threshold(&device_id)
        }
        SettingsCommands::SnoozeDuration { minutes } => client.set_snooze_duration(minutes),
        SettingsCommands::Snooze { device_id } => client.snooze_device(&device_id),
        SettingsCommands::ClearSnooze { device_id } => client.clear_snooze(&device_id),
        SettingsCommands::Rename { device_id, name } => client.rename_device(&device_id, &name),
    };
    result.map_err(|e| eyre!("{}", e))?;

    let settings = client.get_settings().map_err(|e| eyre!("{}", e))?;
    print_settings(&settings);
    Ok(())
}

fn print_settings(settings: &NotificationSettings) {
    println!("Notification Settings");
    println!("{}", "-".repeat(40));
    println!(
        "Enabled:           {}",
        if settings.enabled { "yes" } else { "no" }
    );
    println!("Default threshold: {}%", settings.default_threshold);
    println!("Snooze duration:   {} minutes", settings.snooze_duration_mins);
    if !settings.device_thresholds.is_empty() {
        println!("Device overrides:");
        for (device_id, threshold) in &settings.device_thresholds {
            println!("  {:<40} {}%", device_id, threshold);
        }
    }
}

fn run_daemon_command(
    command: DaemonCommands,
    log_level: LogLevel,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    match command {
        DaemonCommands::Start { foreground } => {
            if is_daemon_running() {
                println!("Daemon is already running.");
                return Ok(());
            }

            if foreground {
                let _guard = logging::init(log_level, LogMode::Both, log_level_override);
                println!("Starting daemon in foreground...");
                println!("Press Ctrl+C to stop.");
                run_daemon(true, log_level, log_level_override)
                    .map_err(|e| eyre!("{}", e))?;
            } else {
                println!("Starting daemon...");
                println!("Socket: {:?}", socket_path());
                run_daemon(false, log_level, log_level_override)
                    .map_err(|e| eyre!("{}", e))?;
            }
        }
        DaemonCommands::Stop => {
            if !is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }

            match DaemonClient::connect() {
                Ok(mut client) => {
                    client.shutdown().map_err(|e| eyre!("{}", e))?;
                    println!("Daemon stopped.");
                }
                Err(e) => {
                    eprintln!("Failed to connect to daemon: {}", e);
                    std::process::exit(1);
                }
            }
        }
        DaemonCommands::Status => {
            if !is_daemon_running() {
                println!("Daemon is not running.");
                return Ok(());
            }

            match DaemonClient::connect() {
                Ok(mut client) => {
                    let status = client.get_status().map_err(|e| eyre!("{}", e))?;
                    println!("Daemon Status");
                    println!("{}", "-".repeat(40));
                    println!("Running:        yes");
                    println!("Version:        {}", status.version);
                    println!(
                        "Uptime:         {}",
                        humantime::format_duration(Duration::from_secs(status.uptime_secs))
                    );
                    println!(
                        "Devices:        {} ({} connected)",
                        status.device_count, status.connected_count
                    );
                    println!("Poll interval:  {}s", status.poll_interval_secs);
                    println!(
                        "Notifications:  {}",
                        if status.notifications_enabled {
                            "enabled"
                        } else {
                            "disabled"
                        }
                    );
                    println!("Subscribers:    {}", status.subscriber_count);
                    if let Some(last) = status.last_poll_time {
                        if let Some(dt) = chrono::DateTime::from_timestamp(last, 0) {
                            println!("Last poll:      {}", dt.format("%Y-%m-%d %H:%M:%S UTC"));
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Failed to connect to daemon: {}", e);
                    std::process::exit(1);
                }
            }
        }
        DaemonCommands::Logs { lines } => {
            let Some(path) = latest_log_path() else {
                println!("No log file found in {:?}", config::runtime_dir());
                return Ok(());
            };

            std::process::Command::new("tail")
                .args(["-n", &lines.to_string()])
                .arg(&path)
                .status()?;
        }
    }

    Ok(())
}

fn run_config(path: bool, reset: bool, edit: bool) -> Result<()> {
    let config_file = config_path();

    if path {
        println!("{}", config_file.display());
        return Ok(());
    }

    if reset {
        let config = UserConfig::default();
        config.save()?;
        println!("Config reset to defaults at: {}", config_file.display());
        return Ok(());
    }

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());

        if !config_file.exists() {
            UserConfig::default().save()?;
        }

        std::process::Command::new(editor)
            .arg(&config_file)
            .status()?;

        return Ok(());
    }

    let config = UserConfig::load();
    println!("Config file: {}", config_file.display());
    println!();
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
