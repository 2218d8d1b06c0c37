use std::collections::HashMap;
use std::fs;
use std::time::{Duration, Instant};

use btbat_protocol::{
    DaemonRequest, DaemonResponse, DaemonStatus, DeviceSnapshot, MAX_SUBSCRIBERS,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{runtime_dir, UserConfig};
use crate::daemon::socket_path;
use crate::data::{spawn_delivery_task, DesktopSink, DeviceData, NotificationEngine};
use crate::store::{names_path, settings_path, NameStore, SettingsStore};

#[cfg(not(all(target_os = "linux", feature = "linux")))]
compile_error!("The btbat daemon requires the `linux` feature (BlueZ backend).");

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bluetooth adapter unavailable: {0}")]
    Adapter(String),

    #[error("Already running")]
    AlreadyRunning,

    #[error("Failed to daemonize: {0}")]
    Daemonize(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

type ClientId = u64;

enum ClientMessage {
    Request { request: DaemonRequest },
    Disconnect,
}

struct ClientHandle {
    response_tx: mpsc::Sender<DaemonResponse>,
    is_subscriber: bool,
}

struct DaemonState {
    devices: DeviceData,
    names: NameStore,
    engine: NotificationEngine,
    snapshots: Vec<DeviceSnapshot>,
    start_time: Instant,
    last_poll_time: Option<i64>,
    poll_interval_secs: u64,
}

impl DaemonState {
    /// One unit of work per tick: resolve all devices, then evaluate
    /// notifications against the same list.
    async fn poll(&mut self) {
        let snapshots = self.devices.refresh(&self.names).await;
        self.engine.evaluate(&snapshots);
        self.last_poll_time = Some(chrono::Utc::now().timestamp());
        self.snapshots = snapshots;
    }

    fn get_status(&self, subscriber_count: usize) -> DaemonStatus {
        DaemonStatus {
            running: true,
            uptime_secs: self.start_time.elapsed().as_secs(),
            device_count: self.snapshots.len(),
            connected_count: self.snapshots.iter().filter(|s| s.connected).count(),
            last_poll_time: self.last_poll_time,
            poll_interval_secs: self.poll_interval_secs,
            notifications_enabled: self.engine.settings().enabled,
            version: env!("CARGO_PKG_VERSION").to_string(),
            subscriber_count,
            ..Default::default()
        }
    }

    fn handle_request(&mut self, request: &DaemonRequest, subscriber_count: usize) -> DaemonResponse {
        match request {
            DaemonRequest::GetDevices => DaemonResponse::Devices(self.snapshots.clone()),
            DaemonRequest::GetStatus => DaemonResponse::Status(self.get_status(subscriber_count)),
            DaemonRequest::GetSettings => DaemonResponse::Settings(self.engine.settings()),
            DaemonRequest::SetEnabled { enabled } => {
                self.engine.set_enabled(*enabled);
                DaemonResponse::Ok
            }
            DaemonRequest::SetDefaultThreshold { threshold } => {
                self.engine.set_default_threshold(*threshold);
                DaemonResponse::Ok
            }
            DaemonRequest::SetDeviceThreshold {
                device_id,
                threshold,
            } => {
                self.engine.set_device_threshold(device_id, *threshold);
                DaemonResponse::Ok
            }
            DaemonRequest::ClearDeviceThreshold { device_id } => {
                self.engine.clear_device_threshold(device_id);
                DaemonResponse::Ok
            }
            DaemonRequest::SetSnoozeDuration { minutes } => {
                self.engine.set_snooze_duration(*minutes);
                DaemonResponse::Ok
            }
            DaemonRequest::SnoozeDevice { device_id } => {
                self.engine.snooze_device(device_id);
                DaemonResponse::Ok
            }
            DaemonRequest::ClearSnooze { device_id } => {
                self.engine.clear_snooze(device_id);
                DaemonResponse::Ok
            }
            DaemonRequest::RenameDevice { device_id, name } => {
                match self.names.set(device_id, name) {
                    Ok(()) => DaemonResponse::Ok,
                    Err(e) => DaemonResponse::Error(e.to_string()),
                }
            }
            DaemonRequest::Shutdown
            | DaemonRequest::Subscribe
            | DaemonRequest::Unsubscribe => {
                DaemonResponse::Error("Handled separately".to_string())
            }
        }
    }
}

async fn client_reader_task(
    mut reader: BufReader<tokio::net::unix::OwnedReadHalf>,
    msg_tx: mpsc::Sender<(ClientId, ClientMessage)>,
    client_id: ClientId,
) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
            Ok(_) => match DaemonRequest::from_json(line.trim()) {
                Ok(request) => {
                    if msg_tx
                        .send((client_id, ClientMessage::Request { request }))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    warn!(client_id, error = %e, "Invalid request from client");
                }
            },
            Err(e) => {
                debug!(client_id, error = %e, "Client read error");
                let _ = msg_tx.send((client_id, ClientMessage::Disconnect)).await;
                break;
            }
        }
    }
}

async fn client_writer_task(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut response_rx: mpsc::Receiver<DaemonResponse>,
) {
    while let Some(response) = response_rx.recv().await {
        let json = match response.to_json() {
            Ok(json) => json,
            Err(_) => continue,
        };
        if writer
            .write_all(format!("{}\n", json).as_bytes())
            .await
            .is_err()
        {
            break;
        }
    }
}

pub fn run_daemon(
    foreground: bool,
    log_level: crate::config::LogLevel,
    log_level_override: Option<crate::config::LogLevel>,
) -> Result<()> {
    let socket = socket_path();

    if socket.exists() {
        if crate::daemon::is_daemon_running() {
            return Err(DaemonError::AlreadyRunning);
        }
        fs::remove_file(&socket)?;
    }

    fs::create_dir_all(runtime_dir())?;

    if !foreground {
        match daemonize::Daemonize::new()
            .working_directory(runtime_dir())
            .start()
        {
            Ok(_) => {}
            Err(e) => return Err(DaemonError::Daemonize(e.to_string())),
        }
        // Logging starts after the fork so the appender thread survives.
        let guard =
            crate::logging::init(log_level, crate::logging::LogMode::File, log_level_override);
        std::mem::forget(guard);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Daemon starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_daemon_async(socket))
}

async fn run_daemon_async(socket: std::path::PathBuf) -> Result<()> {
    let config = UserConfig::load();

    let devices = DeviceData::with_system_probes()
        .await
        .map_err(|e| DaemonError::Adapter(e.to_string()))?;

    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let engine = NotificationEngine::new(SettingsStore::open(settings_path()), alert_tx);
    spawn_delivery_task(alert_rx, Box::new(DesktopSink));

    let mut state = DaemonState {
        devices,
        names: NameStore::open(names_path()),
        engine,
        snapshots: Vec::new(),
        start_time: Instant::now(),
        last_poll_time: None,
        poll_interval_secs: config.poll_interval_secs.max(1),
    };

    let listener = UnixListener::bind(&socket)?;
    info!(socket = ?socket, "Listening for connections");

    let mut poll_tick = tokio::time::interval(Duration::from_secs(state.poll_interval_secs));
    // Skip missed ticks so a slow poll never stacks a second pass behind it.
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (msg_tx, mut msg_rx) = mpsc::channel::<(ClientId, ClientMessage)>(256);
    let mut clients: HashMap<ClientId, ClientHandle> = HashMap::new();
    let mut next_client_id: ClientId = 1;
    let mut shutdown_requested = false;

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                state.poll().await;

                let subscriber_count = clients.values().filter(|c| c.is_subscriber).count();
                if subscriber_count > 0 {
                    let update = DaemonResponse::DeviceUpdate(state.snapshots.clone());

                    let mut disconnected = Vec::new();
                    for (id, client) in &clients {
                        if client.is_subscriber
                            && client.response_tx.send(update.clone()).await.is_err()
                        {
                            disconnected.push(*id);
                        }
                    }
                    for id in disconnected {
                        clients.remove(&id);
                        debug!(client_id = id, "Removed disconnected subscriber");
                    }
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let client_id = next_client_id;
                        next_client_id += 1;
                        debug!(client_id, "Client connected");

                        let (reader, writer) = stream.into_split();
                        let (response_tx, response_rx) = mpsc::channel::<DaemonResponse>(64);

                        clients.insert(client_id, ClientHandle {
                            response_tx,
                            is_subscriber: false,
                        });

                        tokio::task::spawn_local(client_reader_task(
                            BufReader::new(reader),
                            msg_tx.clone(),
                            client_id,
                        ));
                        tokio::task::spawn_local(client_writer_task(writer, response_rx));
                    }
                    Err(e) => {
                        error!(error = %e, "Socket accept error");
                    }
                }
            }
            Some((client_id, msg)) = msg_rx.recv() => {
                match msg {
                    ClientMessage::Disconnect => {
                        if clients.remove(&client_id).is_some() {
                            debug!(client_id, count = clients.len(), "Client disconnected");
                        }
                    }
                    ClientMessage::Request { request } => {
                        debug!(client_id, request = ?request, "Handling request");

                        let response = match &request {
                            DaemonRequest::Subscribe => {
                                let subscriber_count = clients.values().filter(|c| c.is_subscriber).count();
                                if subscriber_count >= MAX_SUBSCRIBERS {
                                    DaemonResponse::SubscriptionRejected {
                                        reason: format!("Maximum subscribers ({}) reached", MAX_SUBSCRIBERS),
                                    }
                                } else if let Some(client) = clients.get_mut(&client_id) {
                                    client.is_subscriber = true;
                                    info!(client_id, count = subscriber_count + 1, "Subscriber added");
                                    DaemonResponse::Subscribed
                                } else {
                                    DaemonResponse::Error("Client not found".to_string())
                                }
                            }
                            DaemonRequest::Unsubscribe => {
                                if let Some(client) = clients.get_mut(&client_id) {
                                    if client.is_subscriber {
                                        client.is_subscriber = false;
                                        let subscriber_count = clients.values().filter(|c| c.is_subscriber).count();
                                        info!(client_id, count = subscriber_count, "Subscriber removed");
                                    }
                                }
                                DaemonResponse::Unsubscribed
                            }
                            DaemonRequest::Shutdown => {
                                info!("Shutdown requested by client");
                                shutdown_requested = true;
                                DaemonResponse::Ok
                            }
                            _ => {
                                let subscriber_count = clients.values().filter(|c| c.is_subscriber).count();
                                state.handle_request(&request, subscriber_count)
                            }
                        };

                        if let Some(client) = clients.get(&client_id) {
                            let _ = client.response_tx.send(response).await;
                        }

                        if shutdown_requested {
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Daemon shutting down");
    fs::remove_file(&socket).ok();

    Ok(())
}
