// src/storage.rs - Namespaced key/value persistence
//
// The relay persists very little: the two server addresses and the
// watchdog statistics. The store is a single JSON document of
// `{ namespace: { key: value } }`, rewritten whole through a temp file so a
// power cut mid-write leaves the previous document intact.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::StoreError;
use crate::server_config::{Address, ServerConfig};

pub const NTP_CONFIG_NAMESPACE: &str = "ntp-config";
pub const NTP_SERVER1_KEY: &str = "ntpServer1";
pub const NTP_SERVER2_KEY: &str = "ntpServer2";

pub const WDT_STATS_NAMESPACE: &str = "wdt-stats";
pub const WDT_RESET_COUNT_KEY: &str = "resetCount";
pub const WDT_LAST_REBOOT_KEY: &str = "lastReboot";
pub const WDT_UPTIME_KEY: &str = "uptime";

type Document = BTreeMap<String, BTreeMap<String, Value>>;

pub trait KeyValueStore: Send {
    fn get(&self, namespace: &str, key: &str) -> Option<Value>;
    fn put(&mut self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError>;

    fn get_str(&self, namespace: &str, key: &str) -> Option<String> {
        match self.get(namespace, key)? {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn get_u64(&self, namespace: &str, key: &str) -> Option<u64> {
        self.get(namespace, key)?.as_u64()
    }
}

/// Volatile store; nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    doc: Document,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.doc.get(namespace)?.get(key).cloned()
    }

    fn put(&mut self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.doc
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON file on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    doc: Document,
}

impl FileStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let doc = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Document::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No store at {}, starting empty", path.display());
                Document::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, doc })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.doc)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.doc.get(namespace)?.get(key).cloned()
    }

    fn put(&mut self, namespace: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.doc
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self.flush()
    }
}

/// Reload the persisted server pair. The primary must be a usable address;
/// an empty secondary means none.
pub fn load_server_config(store: &dyn KeyValueStore) -> Option<ServerConfig> {
    let primary = store.get_str(NTP_CONFIG_NAMESPACE, NTP_SERVER1_KEY)?;
    let primary = Address::new(primary);
    if !primary.is_usable() {
        tracing::info!("No stored server configuration, waiting for master");
        return None;
    }
    let secondary = store
        .get_str(NTP_CONFIG_NAMESPACE, NTP_SERVER2_KEY)
        .filter(|s| !s.is_empty())
        .map(Address::new);
    tracing::info!(
        "Loaded stored servers: primary {} secondary {}",
        primary,
        secondary.as_ref().map_or("none", Address::as_str)
    );
    Some(ServerConfig::new(primary, secondary))
}

pub fn save_server_config(
    store: &mut dyn KeyValueStore,
    config: &ServerConfig,
) -> Result<(), StoreError> {
    store.put(
        NTP_CONFIG_NAMESPACE,
        NTP_SERVER1_KEY,
        Value::from(config.primary().as_str()),
    )?;
    store.put(
        NTP_CONFIG_NAMESPACE,
        NTP_SERVER2_KEY,
        Value::from(config.secondary().map_or("", Address::as_str)),
    )?;
    tracing::info!("Server configuration persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = ServerConfig::new(
            Address::new("192.168.1.2"),
            Some(Address::new("192.169.1.1")),
        );
        {
            let mut store = FileStore::open(&path).unwrap();
            save_server_config(&mut store, &config).unwrap();
        }
        let store = FileStore::open(&path).unwrap();
        assert_eq!(load_server_config(&store), Some(config));
    }

    #[test]
    fn empty_secondary_loads_as_none() {
        let mut store = MemoryStore::new();
        let config = ServerConfig::new(Address::new("10.0.0.1"), None);
        save_server_config(&mut store, &config).unwrap();
        assert_eq!(
            store.get_str(NTP_CONFIG_NAMESPACE, NTP_SERVER2_KEY).as_deref(),
            Some("")
        );
        assert_eq!(load_server_config(&store), Some(config));
    }

    #[test]
    fn short_primary_is_ignored() {
        let mut store = MemoryStore::new();
        store
            .put(NTP_CONFIG_NAMESPACE, NTP_SERVER1_KEY, Value::from("1.1.1"))
            .unwrap();
        assert_eq!(load_server_config(&store), None);
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nope.json")).unwrap();
        assert_eq!(store.get_u64(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY), None);
    }

    #[test]
    fn numbers_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut store = FileStore::open(&path).unwrap();
        store
            .put(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY, Value::from(3u64))
            .unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_u64(WDT_STATS_NAMESPACE, WDT_RESET_COUNT_KEY), Some(3));
    }
}
