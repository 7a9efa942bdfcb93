//! Backup store - the legacy snapshot, kept inside the legacy store itself
//!
//! The snapshot is written under `keys::BACKUP` as a JSON envelope:
//!
//! ```json
//! { "format": 1, "created_at": "...", "checksum": "<blake3>", "snapshot": { ... } }
//! ```
//!
//! This is the one on-disk format that has to stay readable across versions,
//! since rollback depends on it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::legacy::{keys, LegacyStore};
use crate::model::BackupSnapshot;
use crate::{Error, Result};

/// Envelope format written by this version
pub const BACKUP_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct BackupEnvelope {
    format: u32,
    created_at: String,
    checksum: String,
    snapshot: BackupSnapshot,
}

fn parse_list<T: serde::de::DeserializeOwned>(raw: Option<&String>) -> Result<Vec<T>> {
    match raw.map(|r| r.trim()) {
        Some(raw) if !raw.is_empty() && raw != "null" => Ok(serde_json::from_str(raw)?),
        _ => Ok(Vec::new()),
    }
}

fn checksum(snapshot: &BackupSnapshot) -> Result<String> {
    let bytes = serde_json::to_vec(snapshot)?;
    Ok(blake3::hash(&bytes).to_string())
}

/// Reads, persists and restores legacy snapshots
#[derive(Clone)]
pub struct BackupStore {
    legacy: Arc<dyn LegacyStore>,
}

impl BackupStore {
    pub fn new(legacy: Arc<dyn LegacyStore>) -> Self {
        Self { legacy }
    }

    /// Read every migrated key from the legacy store into a snapshot.
    ///
    /// The raw values are kept alongside the parsed records so a restore
    /// writes back exactly what was read.
    pub async fn capture(&self) -> Result<BackupSnapshot> {
        let mut source = BTreeMap::new();
        for key in keys::ALL_DATA {
            if let Some(raw) = self.legacy.get(key).await? {
                source.insert(key.to_string(), raw);
            }
        }

        Ok(BackupSnapshot {
            vehicles: parse_list(source.get(keys::VEHICLES))?,
            fuel_entries: parse_list(source.get(keys::FUEL_ENTRIES))?,
            service_records: parse_list(source.get(keys::SERVICE_RECORDS))?,
            region: source.get(keys::REGION).cloned(),
            theme_mode: source.get(keys::THEME_MODE).cloned(),
            source: Some(source),
        })
    }

    /// Persist a snapshot under the backup key, replacing any previous one
    pub async fn save(&self, snapshot: &BackupSnapshot) -> Result<()> {
        let envelope = BackupEnvelope {
            format: BACKUP_FORMAT,
            created_at: chrono::Utc::now().to_rfc3339(),
            checksum: checksum(snapshot)?,
            snapshot: snapshot.clone(),
        };
        self.legacy
            .set(keys::BACKUP, &serde_json::to_string(&envelope)?)
            .await
    }

    /// Load the saved snapshot, checking its format and checksum
    pub async fn load(&self) -> Result<Option<BackupSnapshot>> {
        let Some(raw) = self.legacy.get(keys::BACKUP).await? else {
            return Ok(None);
        };

        let envelope: BackupEnvelope =
            serde_json::from_str(&raw).map_err(|e| Error::CorruptBackup(e.to_string()))?;

        if envelope.format > BACKUP_FORMAT {
            return Err(Error::CorruptBackup(format!(
                "unsupported backup format {}",
                envelope.format
            )));
        }
        if checksum(&envelope.snapshot)? != envelope.checksum {
            return Err(Error::CorruptBackup("checksum mismatch".to_string()));
        }

        Ok(Some(envelope.snapshot))
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.legacy.get(keys::BACKUP).await?.is_some())
    }

    /// Write the saved snapshot back over the legacy keys.
    ///
    /// Captured snapshots restore their raw values verbatim and remove keys
    /// that were absent at capture time. Hand-built snapshots are serialized
    /// from their records.
    pub async fn restore(&self) -> Result<BackupSnapshot> {
        let snapshot = self.load().await?.ok_or(Error::NoBackup)?;

        match &snapshot.source {
            Some(source) => {
                for key in keys::ALL_DATA {
                    match source.get(*key) {
                        Some(raw) => self.legacy.set(key, raw).await?,
                        None => self.legacy.remove(key).await?,
                    }
                }
            }
            None => self.restore_records(&snapshot).await?,
        }

        tracing::info!(
            "Restored legacy store from backup ({} vehicles, {} fuel entries, {} service records)",
            snapshot.vehicles.len(),
            snapshot.fuel_entries.len(),
            snapshot.service_records.len()
        );
        Ok(snapshot)
    }

    async fn restore_records(&self, snapshot: &BackupSnapshot) -> Result<()> {
        self.legacy
            .set(keys::VEHICLES, &serde_json::to_string(&snapshot.vehicles)?)
            .await?;
        self.legacy
            .set(keys::FUEL_ENTRIES, &serde_json::to_string(&snapshot.fuel_entries)?)
            .await?;
        self.legacy
            .set(keys::SERVICE_RECORDS, &serde_json::to_string(&snapshot.service_records)?)
            .await?;

        for (key, value) in [(keys::REGION, &snapshot.region), (keys::THEME_MODE, &snapshot.theme_mode)] {
            match value {
                Some(v) => self.legacy.set(key, v).await?,
                None => self.legacy.remove(key).await?,
            }
        }
        Ok(())
    }

    /// Delete the backup. Only call once post-migration operation is confirmed stable.
    pub async fn clear(&self) -> Result<()> {
        self.legacy.remove(keys::BACKUP).await
    }
}
