//! Migration log - append-only record of migration attempts

use std::sync::Arc;

use crate::model::MigrationLogEntry;
use crate::storage::StorageManager;
use crate::value::Value;
use crate::Result;

/// Reads and appends `migration_log` rows through the storage manager
#[derive(Clone)]
pub struct MigrationLog {
    manager: Arc<StorageManager>,
}

impl MigrationLog {
    pub fn new(manager: Arc<StorageManager>) -> Self {
        Self { manager }
    }

    /// Record one attempt. Existing rows are never touched.
    pub async fn append(&self, version: u32, success: bool) -> Result<MigrationLogEntry> {
        let applied_at = chrono::Utc::now().to_rfc3339();
        let res = self
            .manager
            .execute_sql(
                "INSERT INTO migration_log (version, applied_at, success) VALUES (?, ?, ?)",
                &[Value::from(version), Value::from(applied_at.as_str()), Value::from(success)],
            )
            .await?;

        tracing::info!(
            "Migration log: version {} recorded as {}",
            version,
            if success { "success" } else { "failure" }
        );

        Ok(MigrationLogEntry {
            id: res.insert_id.as_ref().and_then(Value::as_i64),
            version,
            applied_at,
            success,
        })
    }

    /// All attempts, oldest first
    pub async fn entries(&self) -> Result<Vec<MigrationLogEntry>> {
        let res = self.manager.execute_sql("SELECT * FROM migration_log", &[]).await?;
        Ok(res.rows().iter().filter_map(MigrationLogEntry::from_row).collect())
    }

    /// Attempts for one version, oldest first
    pub async fn entries_for(&self, version: u32) -> Result<Vec<MigrationLogEntry>> {
        let res = self
            .manager
            .execute_sql("SELECT * FROM migration_log WHERE version = ?", &[Value::from(version)])
            .await?;
        Ok(res.rows().iter().filter_map(MigrationLogEntry::from_row).collect())
    }

    /// True iff a successful attempt exists for `version`. Failed attempts never count.
    pub async fn is_applied(&self, version: u32) -> Result<bool> {
        Ok(self.entries_for(version).await?.iter().any(|e| e.success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageConfig;

    async fn check_log(config: StorageConfig) {
        let log = MigrationLog::new(Arc::new(StorageManager::new(config)));
        assert!(!log.is_applied(1).await.unwrap());

        log.append(1, false).await.unwrap();
        log.append(1, false).await.unwrap();
        assert!(!log.is_applied(1).await.unwrap());

        log.append(2, true).await.unwrap();
        assert!(!log.is_applied(1).await.unwrap());
        assert!(log.is_applied(2).await.unwrap());

        let entry = log.append(1, true).await.unwrap();
        assert_eq!(entry.id, Some(4));
        assert!(log.is_applied(1).await.unwrap());

        let entries = log.entries().await.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries.iter().map(|e| e.success).collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
    }

    #[tokio::test]
    async fn test_log_native() {
        check_log(StorageConfig::in_memory()).await;
    }

    #[tokio::test]
    async fn test_log_fallback() {
        check_log(StorageConfig::fallback_only()).await;
    }
}
