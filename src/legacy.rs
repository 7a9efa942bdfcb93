//! Legacy key-value store
//!
//! The store being migrated away from: a flat map of string keys to string
//! values, where collections are JSON arrays serialized into a single value.
//! The backup snapshot lives inside this same store so it survives a wiped
//! relational database.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Error, Result};

/// Keys used by the legacy application
pub mod keys {
    pub const VEHICLES: &str = "vehicles";
    pub const FUEL_ENTRIES: &str = "fuelEntries";
    pub const SERVICE_RECORDS: &str = "serviceRecords";
    pub const REGION: &str = "region";
    pub const THEME_MODE: &str = "themeMode";

    /// Where the migration snapshot is kept
    pub const BACKUP: &str = "legacy_backup";

    /// Every key the migration reads
    pub const ALL_DATA: &[&str] = &[VEHICLES, FUEL_ENTRIES, SERVICE_RECORDS, REGION, THEME_MODE];
}

/// Async string key-value store
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory legacy store
#[derive(Debug, Default)]
pub struct MemoryLegacyStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryLegacyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of every key and value
    pub fn contents(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Io(std::io::Error::other("legacy store lock poisoned")))
    }
}

#[async_trait]
impl LegacyStore for MemoryLegacyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// Legacy store persisted as one JSON object file
///
/// Every write rewrites the file through a temporary sibling and a rename, so
/// a crash leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileLegacyStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: tokio::sync::Mutex<()>,
}

impl FileLegacyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for FileLegacyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.load().await?.into_keys().collect())
    }
}
