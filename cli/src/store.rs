//! Flat JSON stores for user-assigned device names and notification
//! settings.
//!
//! Both files are read once at startup and rewritten wholesale on every
//! change. A missing or corrupt file falls back to defaults; write failures
//! are logged and never fatal — the in-memory copy stays authoritative.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use btbat_protocol::NotificationSettings;
use tracing::warn;

use crate::config::data_dir;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("device id must not be empty")]
    EmptyDeviceId,
}

pub fn names_path() -> PathBuf {
    data_dir().join("device-names.json")
}

pub fn settings_path() -> PathBuf {
    data_dir().join("notification-settings.json")
}

/// User-assigned display-name overlay, keyed by device id.
pub struct NameStore {
    path: PathBuf,
    names: BTreeMap<String, String>,
}

impl NameStore {
    pub fn open(path: PathBuf) -> Self {
        let names = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = ?path, error = %e, "Invalid device-names file, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, names }
    }

    /// The custom name when one is assigned, else the device-reported one.
    pub fn display_name(&self, device_id: &str, fallback: &str) -> String {
        self.names
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Assigns a custom name. An empty or whitespace-only name clears the
    /// override instead.
    pub fn set(&mut self, device_id: &str, name: &str) -> Result<(), StoreError> {
        if device_id.is_empty() {
            return Err(StoreError::EmptyDeviceId);
        }
        let name = name.trim();
        if name.is_empty() {
            self.names.remove(device_id);
        } else {
            self.names.insert(device_id.to_string(), name.to_string());
        }
        self.persist();
        Ok(())
    }

    pub fn clear(&mut self, device_id: &str) -> Result<(), StoreError> {
        if device_id.is_empty() {
            return Err(StoreError::EmptyDeviceId);
        }
        self.names.remove(device_id);
        self.persist();
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = write_json(&self.path, &self.names) {
            warn!(path = ?self.path, error = %e, "Failed to save device names");
        }
    }
}

/// Wholesale persistence for [`NotificationSettings`].
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn open(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> NotificationSettings {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = ?self.path, error = %e, "Invalid settings file, using defaults");
                NotificationSettings::default()
            }),
            Err(_) => NotificationSettings::default(),
        }
    }

    pub fn save(&self, settings: &NotificationSettings) {
        if let Err(e) = write_json(&self.path, settings) {
            warn!(path = ?self.path, error = %e, "Failed to save notification settings");
        }
    }
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("btbat-store-test-{}-{}.json", std::process::id(), name))
    }

    #[test]
    fn test_display_name_falls_back() {
        let store = NameStore::open(temp_path("missing"));
        assert_eq!(store.display_name("dev", "Factory Name"), "Factory Name");
    }

    #[test]
    fn test_set_and_reload_names() {
        let path = temp_path("roundtrip");
        let mut store = NameStore::open(path.clone());
        store.set("dev1", "Kitchen Speaker").unwrap();

        let reloaded = NameStore::open(path.clone());
        assert_eq!(reloaded.display_name("dev1", "x"), "Kitchen Speaker");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_empty_name_clears_override() {
        let path = temp_path("clear-by-empty");
        let mut store = NameStore::open(path.clone());
        store.set("dev1", "Custom").unwrap();
        store.set("dev1", "  ").unwrap();
        assert_eq!(store.display_name("dev1", "Factory"), "Factory");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_empty_device_id_is_rejected() {
        let mut store = NameStore::open(temp_path("reject"));
        assert!(matches!(
            store.set("", "name"),
            Err(StoreError::EmptyDeviceId)
        ));
        assert!(matches!(store.clear(""), Err(StoreError::EmptyDeviceId)));
    }

    #[test]
    fn test_settings_default_on_missing_file() {
        let store = SettingsStore::open(temp_path("no-settings"));
        assert_eq!(store.load(), NotificationSettings::default());
    }

    #[test]
    fn test_settings_save_and_reload() {
        let path = temp_path("settings-roundtrip");
        let store = SettingsStore::open(path.clone());

        let mut settings = NotificationSettings::default();
        settings.enabled = false;
        settings.default_threshold = 35;
        settings
            .device_thresholds
            .insert("dev1".to_string(), 10);
        store.save(&settings);

        assert_eq!(store.load(), settings);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_settings_corrupt_file_falls_back() {
        let path = temp_path("settings-corrupt");
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::open(path.clone());
        assert_eq!(store.load(), NotificationSettings::default());

        let _ = fs::remove_file(path);
    }
}
