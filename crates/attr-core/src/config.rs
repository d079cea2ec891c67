//! Bridge configuration and persistence storage abstraction.
//!
//! Non-volatile attributes are written through [`PersistenceStorage`], which
//! can be implemented differently on each platform:
//! - Host builds and tests: [`MemoryStorage`]
//! - Devices: a flash key/value store
//!
//! Values are stored in the raw attribute layout, keyed by
//! [`AttributePath::storage_key`].

use crate::path::AttributePath;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Errors that can occur during configuration and storage operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// No value is stored under the key.
    NotFound(String),
    /// Failed to read stored data.
    ReadError(String),
    /// Failed to write data.
    WriteError(String),
    /// Stored or supplied data is invalid.
    InvalidData(String),
    /// Storage is not available.
    StorageUnavailable(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "Value not found: {}", key),
            ConfigError::ReadError(msg) => write!(f, "Read error: {}", msg),
            ConfigError::WriteError(msg) => write!(f, "Write error: {}", msg),
            ConfigError::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            ConfigError::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Failure(err.to_string())
    }
}

/// Bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// How long to wait for the processing lock. `None` waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,

    /// Quiescence delay before deferred attributes are persisted.
    pub deferred_persistence_ms: u64,

    /// Largest raw value copy the bridge will produce.
    pub attribute_buffer_largest: usize,

    /// Default capacity for string attributes created without an explicit size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_size: Option<u16>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: None,
            deferred_persistence_ms: 3000,
            attribute_buffer_largest: 259,
            max_string_size: None,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON configuration document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidData(e.to_string()))
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn deferred_persistence_delay(&self) -> Duration {
        Duration::from_millis(self.deferred_persistence_ms)
    }
}

/// Durable storage for non-volatile attribute values.
///
/// All methods are synchronous; implementations must be callable from any
/// thread.
pub trait PersistenceStorage: Send + Sync {
    /// Store the raw value of an attribute.
    fn store_value(&self, path: &AttributePath, raw: &[u8]) -> Result<(), ConfigError>;

    /// Load the raw value of an attribute.
    fn load_value(&self, path: &AttributePath) -> Result<Vec<u8>, ConfigError>;

    /// Remove the stored value of an attribute. Missing values are not an error.
    fn erase_value(&self, path: &AttributePath) -> Result<(), ConfigError>;

    /// Check whether a value is stored for an attribute.
    fn has_value(&self, path: &AttributePath) -> bool;
}

/// In-memory persistence.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `store_value` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn unavailable() -> ConfigError {
        ConfigError::StorageUnavailable("storage lock poisoned".to_string())
    }
}

impl PersistenceStorage for MemoryStorage {
    fn store_value(&self, path: &AttributePath, raw: &[u8]) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|_| Self::unavailable())?
            .insert(path.storage_key(), raw.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load_value(&self, path: &AttributePath) -> Result<Vec<u8>, ConfigError> {
        let key = path.storage_key();
        self.data
            .read()
            .map_err(|_| Self::unavailable())?
            .get(&key)
            .cloned()
            .ok_or(ConfigError::NotFound(key))
    }

    fn erase_value(&self, path: &AttributePath) -> Result<(), ConfigError> {
        self.data
            .write()
            .map_err(|_| Self::unavailable())?
            .remove(&path.storage_key());
        Ok(())
    }

    fn has_value(&self, path: &AttributePath) -> bool {
        self.data
            .read()
            .map(|data| data.contains_key(&path.storage_key()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.lock_timeout(), None);
        assert_eq!(config.deferred_persistence_delay(), Duration::from_secs(3));
        assert_eq!(config.attribute_buffer_largest, 259);
    }

    #[test]
    fn test_config_from_json() {
        let config =
            BridgeConfig::from_json(r#"{"lockTimeoutMs": 250, "maxStringSize": 32}"#).unwrap();
        assert_eq!(config.lock_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_string_size, Some(32));
        assert_eq!(config.deferred_persistence_ms, 3000);

        let json = serde_json::to_string(&BridgeConfig::default()).unwrap();
        assert!(json.contains("deferredPersistenceMs"));
        assert!(!json.contains("lockTimeoutMs"));

        assert!(matches!(
            BridgeConfig::from_json("{"),
            Err(ConfigError::InvalidData(_))
        ));
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let path = AttributePath::new(1, 6, 0);

        assert!(!storage.has_value(&path));
        assert!(matches!(storage.load_value(&path), Err(ConfigError::NotFound(_))));

        storage.store_value(&path, &[1]).unwrap();
        assert!(storage.has_value(&path));
        assert_eq!(storage.load_value(&path).unwrap(), vec![1]);
        assert_eq!(storage.write_count(), 1);

        storage.erase_value(&path).unwrap();
        assert!(!storage.has_value(&path));
        storage.erase_value(&path).unwrap();
    }
}
