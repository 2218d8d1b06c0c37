//! Low-battery notification engine.
//!
//! Per-device state machine: Normal (no stored timestamp) and
//! Alerted-Snoozed (an alert fired and the snooze window has not elapsed).
//! All settings and snooze state live behind one mutex — the single
//! serialization boundary shared by the poll cycle and concurrent settings
//! updates arriving over IPC.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use btbat_protocol::{
    DeviceKind, DeviceSnapshot, NotificationSettings, SNOOZE_MINUTES_RANGE, THRESHOLD_RANGE,
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tracing::info;

use crate::store::SettingsStore;

/// One fired alert. Delivery happens elsewhere; the engine's timing state is
/// already updated by the time an event is emitted and is never rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub device_id: String,
    pub display_name: String,
    pub kind: DeviceKind,
    pub level: u8,
}

struct EngineState {
    settings: NotificationSettings,
    /// Device id -> time of the last alert (stored timestamp = snoozed).
    last_alert: HashMap<String, DateTime<Utc>>,
}

pub struct NotificationEngine {
    state: Mutex<EngineState>,
    store: SettingsStore,
    events: mpsc::UnboundedSender<AlertEvent>,
}

impl NotificationEngine {
    pub fn new(store: SettingsStore, events: mpsc::UnboundedSender<AlertEvent>) -> Self {
        let settings = store.load();
        Self {
            state: Mutex::new(EngineState {
                settings,
                last_alert: HashMap::new(),
            }),
            store,
            events,
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Evaluates one poll's snapshot list, firing alerts into the event
    /// channel.
    pub fn evaluate(&self, snapshots: &[DeviceSnapshot]) {
        for event in self.evaluate_at(snapshots, Utc::now()) {
            info!(
                device = %event.display_name,
                level = event.level,
                "low battery alert"
            );
            let _ = self.events.send(event);
        }
    }

    fn evaluate_at(&self, snapshots: &[DeviceSnapshot], now: DateTime<Utc>) -> Vec<AlertEvent> {
        let mut state = self.state();
        let mut fired = Vec::new();

        if !state.settings.enabled {
            return fired;
        }

        for snapshot in snapshots {
            if !snapshot.connected {
                continue;
            }
            let Some(level) = snapshot.battery_percent else {
                continue;
            };

            let threshold = state.settings.threshold_for(&snapshot.id);

            if level > threshold {
                // Unconditional even if the device was never alerted: a
                // recovered battery must alert fresh on its next drop
                // rather than inherit a dormant timer.
                state.last_alert.remove(&snapshot.id);
                continue;
            }

            let snooze = Duration::minutes(state.settings.snooze_duration_mins as i64);
            let due = match state.last_alert.get(&snapshot.id) {
                None => true,
                Some(last) => now - *last >= snooze,
            };

            if due {
                state.last_alert.insert(snapshot.id.clone(), now);
                fired.push(AlertEvent {
                    device_id: snapshot.id.clone(),
                    display_name: snapshot.display_name.clone(),
                    kind: snapshot.kind,
                    level,
                });
            }
        }

        fired
    }

    /// Starts a snooze window now, even for a device currently above its
    /// threshold.
    pub fn snooze_device(&self, device_id: &str) {
        self.snooze_device_at(device_id, Utc::now());
    }

    fn snooze_device_at(&self, device_id: &str, now: DateTime<Utc>) {
        self.state().last_alert.insert(device_id.to_string(), now);
    }

    /// Removes any stored timestamp; the next qualifying poll alerts
    /// immediately.
    pub fn clear_snooze(&self, device_id: &str) {
        self.state().last_alert.remove(device_id);
    }

    pub fn settings(&self) -> NotificationSettings {
        self.state().settings.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state();
        state.settings.enabled = enabled;
        self.store.save(&state.settings);
    }

    pub fn set_default_threshold(&self, threshold: u8) {
        let mut state = self.state();
        state.settings.default_threshold = clamp_threshold(threshold);
        self.store.save(&state.settings);
    }

    pub fn set_device_threshold(&self, device_id: &str, threshold: u8) {
        let mut state = self.state();
        state
            .settings
            .device_thresholds
            .insert(device_id.to_string(), clamp_threshold(threshold));
        self.store.save(&state.settings);
    }

    pub fn clear_device_threshold(&self, device_id: &str) {
        let mut state = self.state();
        state.settings.device_thresholds.remove(device_id);
        self.store.save(&state.settings);
    }

    pub fn set_snooze_duration(&self, minutes: u32) {
        let mut state = self.state();
        state.settings.snooze_duration_mins =
            minutes.clamp(*SNOOZE_MINUTES_RANGE.start(), *SNOOZE_MINUTES_RANGE.end());
        self.store.save(&state.settings);
    }
}

fn clamp_threshold(threshold: u8) -> u8 {
    threshold.clamp(*THRESHOLD_RANGE.start(), *THRESHOLD_RANGE.end())
}
