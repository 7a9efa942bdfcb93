//! Migration orchestrator - one-time move from the legacy store to the relational store
//!
//! ```text
//! NotStarted -> BackupCreated -> Migrating -> Verifying -> Completed
//!                     |              |            |
//!                     +--------------+------------+------> Failed
//! Completed | Failed -> RolledBack
//! ```
//!
//! Recovery does not depend on the relational store's transactions. On the
//! fallback emulator ROLLBACK undoes nothing, so the legacy backup written
//! before the load is the only thing that makes a failed attempt recoverable.
//! `load` refuses to start unless that backup can be read back.

use std::sync::Arc;

use serde::Serialize;

use crate::legacy::LegacyStore;
use crate::model::{AppSetting, BackupSnapshot, FuelEntry, MigrationLogEntry, ServiceRecord, Vehicle};
use crate::storage::{BackendKind, StorageManager};
use crate::{Error, Result};
use super::backup::BackupStore;
use super::log::MigrationLog;
use super::validate;

/// Version recorded in the migration log by this release
pub const CURRENT_VERSION: u32 = 1;

/// Lifecycle of one migration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    NotStarted,
    BackupCreated,
    Migrating,
    Verifying,
    Completed,
    Failed,
    RolledBack,
}

impl MigrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationState::NotStarted => "not_started",
            MigrationState::BackupCreated => "backup_created",
            MigrationState::Migrating => "migrating",
            MigrationState::Verifying => "verifying",
            MigrationState::Completed => "completed",
            MigrationState::Failed => "failed",
            MigrationState::RolledBack => "rolled_back",
        }
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(&self, next: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, next),
            (NotStarted | Completed | Failed | RolledBack, NotStarted)
                | (NotStarted, BackupCreated)
                | (BackupCreated, Migrating)
                | (Migrating, Verifying)
                | (Verifying, Completed)
                | (NotStarted | BackupCreated | Migrating | Verifying, Failed)
                | (NotStarted | Completed | Failed, RolledBack)
        )
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Summary of a completed migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationReport {
    pub version: u32,
    pub backend: BackendKind,
    /// False when the load ran on the fallback emulator
    pub atomic: bool,
    pub vehicles: usize,
    pub fuel_entries: usize,
    pub service_records: usize,
    pub settings: usize,
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Migration v{} ({} backend{}):", self.version, self.backend, if self.atomic { "" } else { ", non-atomic" })?;
        writeln!(f, "  Vehicles: {}", self.vehicles)?;
        writeln!(f, "  Fuel entries: {}", self.fuel_entries)?;
        writeln!(f, "  Service records: {}", self.service_records)?;
        writeln!(f, "  Settings: {}", self.settings)
    }
}

/// Drives the legacy-to-relational migration
pub struct MigrationOrchestrator {
    manager: Arc<StorageManager>,
    backup: BackupStore,
    log: MigrationLog,
    version: u32,
    state: MigrationState,
}

impl MigrationOrchestrator {
    pub fn new(manager: Arc<StorageManager>, legacy: Arc<dyn LegacyStore>) -> Self {
        Self {
            log: MigrationLog::new(Arc::clone(&manager)),
            backup: BackupStore::new(legacy),
            manager,
            version: CURRENT_VERSION,
            state: MigrationState::NotStarted,
        }
    }

    /// Override the version recorded in the log
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    pub fn log(&self) -> &MigrationLog {
        &self.log
    }

    pub fn backup_store(&self) -> &BackupStore {
        &self.backup
    }

    fn transition(&mut self, next: MigrationState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!("Unexpected migration transition {} -> {}", self.state, next);
        }
        tracing::info!("Migration state: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Whether this version has a successful log entry.
    ///
    /// A failed read counts as "not migrated": the caller will attempt the
    /// migration again rather than run against a store it cannot confirm.
    pub async fn is_migrated(&self) -> bool {
        match self.log.is_applied(self.version).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!("Could not read migration log, assuming not migrated: {}", e);
                false
            }
        }
    }

    /// Snapshot the legacy store and persist the snapshot inside it.
    ///
    /// The snapshot is read back before returning so callers know it is durable.
    pub async fn backup_legacy_store(&mut self) -> Result<BackupSnapshot> {
        let snapshot = self.backup.capture().await?;
        self.backup.save(&snapshot).await?;

        let persisted = self.backup.load().await?.ok_or(Error::NoBackup)?;
        if persisted != snapshot {
            return Err(Error::CorruptBackup("backup read back differs from snapshot".to_string()));
        }

        tracing::info!(
            "Legacy backup created ({} vehicles, {} fuel entries, {} service records)",
            snapshot.vehicles.len(),
            snapshot.fuel_entries.len(),
            snapshot.service_records.len()
        );
        self.transition(MigrationState::BackupCreated);
        Ok(persisted)
    }

    /// Structural checks; see `validate::validate_snapshot`
    pub fn validate_snapshot(&self, snapshot: &BackupSnapshot) -> Result<()> {
        validate::validate_snapshot(snapshot)
    }

    /// Insert the snapshot inside one transaction. Returns whether the load was atomic.
    ///
    /// Rows are upserted so a repeat attempt over a partially loaded store
    /// converges instead of failing on existing ids.
    pub async fn load(&mut self, snapshot: &BackupSnapshot) -> Result<bool> {
        self.transition(MigrationState::Migrating);

        let mut tx = self.manager.transaction();
        let atomic = tx.is_atomic().await;
        if !atomic {
            // Rollback below cannot undo anything here; the backup is the recovery path.
            self.backup.load().await?.ok_or(Error::NoBackup)?;
            tracing::warn!("Loading in degraded mode: writes are not atomic, recovery relies on the legacy backup");
        }

        tx.begin().await?;
        match self.insert_all(snapshot).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(atomic)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after failed load also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn insert_all(&self, snapshot: &BackupSnapshot) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        for vehicle in &snapshot.vehicles {
            self.manager.execute_sql(Vehicle::UPSERT_SQL, &vehicle.params(&now)).await?;
        }
        for entry in &snapshot.fuel_entries {
            self.manager.execute_sql(FuelEntry::UPSERT_SQL, &entry.params(&now)).await?;
        }
        for record in &snapshot.service_records {
            self.manager.execute_sql(ServiceRecord::UPSERT_SQL, &record.params(&now)).await?;
        }
        for setting in snapshot.settings() {
            self.manager.execute_sql(AppSetting::UPSERT_SQL, &setting.params(&now)).await?;
        }

        tracing::debug!(
            "Loaded {} vehicles, {} fuel entries, {} service records",
            snapshot.vehicles.len(),
            snapshot.fuel_entries.len(),
            snapshot.service_records.len()
        );
        Ok(())
    }

    /// Count rows per data table and compare against the snapshot
    pub async fn verify(&mut self, snapshot: &BackupSnapshot) -> Result<()> {
        self.transition(MigrationState::Verifying);

        for (table, expected) in snapshot.table_counts() {
            let res = self
                .manager
                .execute_sql(&format!("SELECT COUNT(*) AS count FROM {}", table), &[])
                .await?;
            let actual = res.scalar_i64().unwrap_or(0).max(0) as usize;
            if actual != expected {
                return Err(Error::VerificationMismatch {
                    table: table.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Append the outcome of this attempt to the migration log
    pub async fn mark_migration_complete(&self, success: bool) -> Result<MigrationLogEntry> {
        self.log.append(self.version, success).await
    }

    /// Backup, validate, load, verify and log.
    ///
    /// Every failure after the attempt starts leaves a `success = false` log
    /// entry and the state `Failed`; the error is returned for the caller to
    /// choose between rollback and carrying on.
    pub async fn migrate(&mut self) -> Result<MigrationReport> {
        if self.state != MigrationState::NotStarted {
            self.transition(MigrationState::NotStarted);
        }
        tracing::info!("Starting migration v{}", self.version);

        let snapshot = match self.backup_legacy_store().await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.fail(e).await),
        };

        if let Err(e) = self.validate_snapshot(&snapshot) {
            return Err(self.fail(e).await);
        }

        let atomic = match self.load(&snapshot).await {
            Ok(atomic) => atomic,
            Err(e) => return Err(self.fail(e).await),
        };

        if let Err(e) = self.verify(&snapshot).await {
            return Err(self.fail(e).await);
        }

        if let Err(e) = self.mark_migration_complete(true).await {
            return Err(self.fail(e).await);
        }
        self.transition(MigrationState::Completed);

        let report = MigrationReport {
            version: self.version,
            backend: self.manager.backend_kind().await.unwrap_or(BackendKind::Fallback),
            atomic,
            vehicles: snapshot.vehicles.len(),
            fuel_entries: snapshot.fuel_entries.len(),
            service_records: snapshot.service_records.len(),
            settings: snapshot.settings().len(),
        };
        tracing::info!("Migration v{} completed", self.version);
        Ok(report)
    }

    async fn fail(&mut self, err: Error) -> Error {
        tracing::error!("Migration v{} failed: {}", self.version, err);
        self.transition(MigrationState::Failed);
        if let Err(log_err) = self.mark_migration_complete(false).await {
            tracing::warn!("Could not record failed migration: {}", log_err);
        }
        err
    }

    /// Startup lifecycle: initialize storage, then migrate if not already done.
    ///
    /// Returns `None` when the current version was already migrated.
    pub async fn ensure_migrated(&mut self) -> Result<Option<MigrationReport>> {
        self.manager.initialize().await;
        if self.is_migrated().await {
            tracing::info!("Migration v{} already applied", self.version);
            return Ok(None);
        }
        self.migrate().await.map(Some)
    }

    /// Delete the legacy backup. Never called automatically.
    pub async fn clear_backup(&self) -> Result<()> {
        self.backup.clear().await?;
        tracing::info!("Legacy backup cleared");
        Ok(())
    }

    /// Make the legacy store the source of truth again.
    ///
    /// Closes the relational connection (a close failure is logged and does
    /// not stop the restore), then restores the legacy keys from the backup.
    /// Whatever the relational store holds is left in place.
    pub async fn rollback(&mut self) -> Result<BackupSnapshot> {
        if let Err(e) = self.manager.close().await {
            let e = match e {
                Error::Connection(_) => e,
                other => Error::Connection(other.to_string()),
            };
            tracing::warn!("{}; continuing rollback", e);
        }

        let snapshot = self.backup.restore().await?;
        self.transition(MigrationState::RolledBack);
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{keys, MemoryLegacyStore};
    use crate::storage::{FallbackBackend, QueryResult, StorageBackend, StorageConfig};
    use crate::value::Value;

    fn fixture() -> BackupSnapshot {
        let mut car = Vehicle::new("v1", "Car");
        car.year = Some(2018);
        car.make = Some("Toyota".to_string());
        let truck = Vehicle::new("v2", "Truck");

        let mut fill = FuelEntry::new("f1", "v1", 10.0, 3.5);
        fill.mpg = Some(31.2);
        fill.station = Some("Shell".to_string());

        BackupSnapshot {
            vehicles: vec![car, truck],
            fuel_entries: vec![
                fill,
                FuelEntry::new("f2", "v1", 12.0, 3.6),
                FuelEntry::new("f3", "v2", 30.0, 3.4),
            ],
            service_records: vec![ServiceRecord::new("s1", "v2", "oil change", 79.99)],
            region: Some("US".to_string()),
            theme_mode: Some("dark".to_string()),
            source: None,
        }
    }

    fn legacy_from(snapshot: &BackupSnapshot) -> Arc<MemoryLegacyStore> {
        let mut entries = vec![
            (keys::VEHICLES, serde_json::to_string(&snapshot.vehicles).unwrap()),
            (keys::FUEL_ENTRIES, serde_json::to_string(&snapshot.fuel_entries).unwrap()),
            (keys::SERVICE_RECORDS, serde_json::to_string(&snapshot.service_records).unwrap()),
        ];
        if let Some(region) = &snapshot.region {
            entries.push((keys::REGION, region.clone()));
        }
        if let Some(theme) = &snapshot.theme_mode {
            entries.push((keys::THEME_MODE, theme.clone()));
        }
        Arc::new(MemoryLegacyStore::with_entries(entries))
    }

    fn setup(config: StorageConfig, snapshot: &BackupSnapshot) -> (Arc<StorageManager>, Arc<MemoryLegacyStore>, MigrationOrchestrator) {
        let manager = Arc::new(StorageManager::new(config));
        let legacy = legacy_from(snapshot);
        let orchestrator = MigrationOrchestrator::new(Arc::clone(&manager), legacy.clone());
        (manager, legacy, orchestrator)
    }

    async fn count(manager: &StorageManager, table: &str) -> i64 {
        manager
            .execute_sql(&format!("SELECT COUNT(*) AS count FROM {}", table), &[])
            .await
            .unwrap()
            .scalar_i64()
            .unwrap()
    }

    async fn check_full_migration(config: StorageConfig, expect_atomic: bool) {
        let (manager, _legacy, mut orchestrator) = setup(config, &fixture());
        assert!(!orchestrator.is_migrated().await);

        let report = orchestrator.migrate().await.unwrap();
        assert_eq!((report.vehicles, report.fuel_entries, report.service_records), (2, 3, 1));
        assert_eq!(report.settings, 2);
        assert_eq!(report.atomic, expect_atomic);
        assert_eq!(orchestrator.state(), MigrationState::Completed);

        assert_eq!(count(&manager, "vehicles").await, 2);
        assert_eq!(count(&manager, "fuel_entries").await, 3);
        assert_eq!(count(&manager, "service_records").await, 1);
        assert_eq!(count(&manager, "app_settings").await, 2);

        assert!(orchestrator.is_migrated().await);
        let entries = orchestrator.log().entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].success);

        // Backup stays until explicitly cleared
        assert!(orchestrator.backup_store().exists().await.unwrap());
        orchestrator.clear_backup().await.unwrap();
        assert!(!orchestrator.backup_store().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_migrate_native() {
        check_full_migration(StorageConfig::in_memory(), true).await;
    }

    #[tokio::test]
    async fn test_migrate_fallback() {
        check_full_migration(StorageConfig::fallback_only(), false).await;
    }

    #[tokio::test]
    async fn test_migrated_rows_are_mapped() {
        let (manager, _legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        orchestrator.migrate().await.unwrap();

        let res = manager
            .execute_sql("SELECT * FROM fuel_entries WHERE id = ?", &[Value::from("f1")])
            .await
            .unwrap();
        let row = &res.rows()[0];
        assert_eq!(row["vehicle_id"], Value::from("v1"));
        assert_eq!(row["fuel_station"], Value::from("Shell"));
        assert_eq!(row["mpg"], Value::Real(31.2));

        let res = manager
            .execute_sql("SELECT value FROM app_settings WHERE key = ?", &[Value::from("themeMode")])
            .await
            .unwrap();
        assert_eq!(res.rows()[0]["value"], Value::from("dark"));
    }

    #[tokio::test]
    async fn test_failed_log_does_not_count_as_migrated() {
        let (_manager, _legacy, orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        orchestrator.mark_migration_complete(false).await.unwrap();
        assert!(!orchestrator.is_migrated().await);

        orchestrator.mark_migration_complete(true).await.unwrap();
        assert!(orchestrator.is_migrated().await);
    }

    #[tokio::test]
    async fn test_other_version_does_not_count_as_migrated() {
        let (manager, legacy, orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        orchestrator.mark_migration_complete(true).await.unwrap();

        let next = MigrationOrchestrator::new(manager, legacy).with_version(2);
        assert!(!next.is_migrated().await);
    }

    #[tokio::test]
    async fn test_verification_mismatch_logs_failure() {
        let (manager, _legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        manager
            .execute_sql(Vehicle::UPSERT_SQL, &Vehicle::new("v9", "Stray").params("now"))
            .await
            .unwrap();

        let err = orchestrator.migrate().await.unwrap_err();
        match err {
            Error::VerificationMismatch { table, expected, actual } => {
                assert_eq!(table, "vehicles");
                assert_eq!((expected, actual), (2, 3));
            }
            other => panic!("expected verification mismatch, got {:?}", other),
        }

        assert_eq!(orchestrator.state(), MigrationState::Failed);
        assert!(!orchestrator.is_migrated().await);
        let entries = orchestrator.log().entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn test_validation_failure_writes_no_rows() {
        for config in [StorageConfig::in_memory(), StorageConfig::fallback_only()] {
            let mut snapshot = fixture();
            snapshot.fuel_entries[1].quantity = -4.0;
            let (manager, _legacy, mut orchestrator) = setup(config, &snapshot);

            let err = orchestrator.migrate().await.unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
            assert_eq!(count(&manager, "fuel_entries").await, 0);
            assert_eq!(count(&manager, "vehicles").await, 0);
            assert!(!orchestrator.is_migrated().await);
            assert_eq!(orchestrator.state(), MigrationState::Failed);
        }
    }

    #[tokio::test]
    async fn test_rollback_restores_legacy_store() {
        let (_manager, legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        let before = legacy.contents().unwrap();

        orchestrator.migrate().await.unwrap();

        // The app kept writing to the legacy store after migration
        legacy.set(keys::VEHICLES, "[]").await.unwrap();
        legacy.remove(keys::REGION).await.unwrap();

        let restored = orchestrator.rollback().await.unwrap();
        assert_eq!(restored.vehicles, fixture().vehicles);
        assert_eq!(restored.fuel_entries, fixture().fuel_entries);
        assert_eq!(orchestrator.state(), MigrationState::RolledBack);

        let after = legacy.contents().unwrap();
        for key in keys::ALL_DATA {
            assert_eq!(after.get(*key), before.get(*key), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_rollback_leaves_relational_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garagelog.db");
        let (_manager, _legacy, mut orchestrator) = setup(StorageConfig::file(&path), &fixture());
        orchestrator.migrate().await.unwrap();
        orchestrator.rollback().await.unwrap();

        let reopened = StorageManager::new(StorageConfig::file(&path));
        assert_eq!(count(&reopened, "vehicles").await, 2);
    }

    #[tokio::test]
    async fn test_rollback_without_backup() {
        let (_manager, _legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        assert!(matches!(orchestrator.rollback().await, Err(Error::NoBackup)));
    }

    #[tokio::test]
    async fn test_retry_over_partial_load_converges() {
        let snapshot = fixture();
        let (manager, _legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &snapshot);

        // An interrupted earlier attempt left some rows behind
        manager
            .execute_sql(Vehicle::UPSERT_SQL, &snapshot.vehicles[0].params("earlier"))
            .await
            .unwrap();
        manager
            .execute_sql(FuelEntry::UPSERT_SQL, &snapshot.fuel_entries[0].params("earlier"))
            .await
            .unwrap();
        orchestrator.mark_migration_complete(false).await.unwrap();

        let report = orchestrator.migrate().await.unwrap();
        assert_eq!(report.fuel_entries, 3);
        assert_eq!(count(&manager, "vehicles").await, 2);
        assert_eq!(count(&manager, "fuel_entries").await, 3);
        assert!(orchestrator.is_migrated().await);
    }

    #[tokio::test]
    async fn test_ensure_migrated_runs_once() {
        let (manager, _legacy, mut orchestrator) = setup(StorageConfig::in_memory(), &fixture());
        assert!(orchestrator.ensure_migrated().await.unwrap().is_some());
        assert!(orchestrator.ensure_migrated().await.unwrap().is_none());
        assert_eq!(manager.selection_count(), 1);
        assert_eq!(orchestrator.log().entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_legacy_store_migrates() {
        let manager = Arc::new(StorageManager::new(StorageConfig::in_memory()));
        let legacy: Arc<dyn LegacyStore> = Arc::new(MemoryLegacyStore::new());
        let mut orchestrator = MigrationOrchestrator::new(manager, legacy);

        let report = orchestrator.migrate().await.unwrap();
        assert_eq!((report.vehicles, report.fuel_entries, report.service_records, report.settings), (0, 0, 0, 0));
        assert!(orchestrator.is_migrated().await);
    }

    #[test]
    fn test_state_machine_edges() {
        use MigrationState::*;
        assert!(NotStarted.can_transition_to(BackupCreated));
        assert!(Verifying.can_transition_to(Failed));
        assert!(Failed.can_transition_to(RolledBack));
        assert!(!NotStarted.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Migrating));
    }

    #[tokio::test]
    async fn test_rollback_restores_hand_written_legacy_json() {
        let vehicles = r#"[{"id":"v1","name":"Car"}]"#;
        let fuel = r#"[{"id":"f1","vehicleId":"v1","date":"2024-01-02","amount":40,"quantity":10,"pricePerUnit":4,"mileage":1200,"fuelStation":"Shell"}]"#;
        let service = r#"[{"id":"s1","vehicleId":"v1","date":"2024-02-01","type":"oil","cost":59,"mileage":1300}]"#;
        let legacy = Arc::new(MemoryLegacyStore::with_entries([
            (keys::VEHICLES, vehicles),
            (keys::FUEL_ENTRIES, fuel),
            (keys::SERVICE_RECORDS, service),
            (keys::REGION, "US"),
        ]));
        let manager = Arc::new(StorageManager::new(StorageConfig::in_memory()));
        let mut orchestrator = MigrationOrchestrator::new(Arc::clone(&manager), legacy.clone());

        orchestrator.migrate().await.unwrap();
        let res = manager
            .execute_sql("SELECT fuel_station FROM fuel_entries WHERE id = ?", &[Value::from("f1")])
            .await
            .unwrap();
        assert_eq!(res.rows()[0]["fuel_station"], Value::from("Shell"));

        legacy.set(keys::VEHICLES, "[]").await.unwrap();
        legacy.set(keys::THEME_MODE, "light").await.unwrap();
        orchestrator.rollback().await.unwrap();

        let after = legacy.contents().unwrap();
        assert_eq!(after[keys::VEHICLES], vehicles);
        assert_eq!(after[keys::FUEL_ENTRIES], fuel);
        assert_eq!(after[keys::SERVICE_RECORDS], service);
        assert_eq!(after[keys::REGION], "US");
        assert!(!after.contains_key(keys::THEME_MODE));
    }

    /// Emulator-backed storage with injectable failures
    struct FaultyBackend {
        inner: FallbackBackend,
        close_fails: bool,
        reject_success_log: bool,
    }

    impl FaultyBackend {
        fn new(close_fails: bool, reject_success_log: bool) -> Self {
            Self {
                inner: FallbackBackend::new(),
                close_fails,
                reject_success_log,
            }
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for FaultyBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Fallback
        }

        async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
            let success_log = sql.contains("migration_log") && params.get(2) == Some(&Value::Integer(1));
            if self.reject_success_log && success_log {
                return Err(Error::QueryExecution("disk I/O error".to_string()));
            }
            self.inner.execute(sql, params).await
        }

        async fn close(&self) -> Result<()> {
            if self.close_fails {
                return Err(Error::Connection("handle already released".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rollback_proceeds_when_close_fails() {
        let manager = Arc::new(StorageManager::with_backend(Arc::new(FaultyBackend::new(true, false))));
        let legacy = legacy_from(&fixture());
        let before = legacy.contents().unwrap();
        let mut orchestrator = MigrationOrchestrator::new(Arc::clone(&manager), legacy.clone());
        orchestrator.migrate().await.unwrap();

        legacy.remove(keys::FUEL_ENTRIES).await.unwrap();
        assert!(manager.close().await.is_err());

        orchestrator.rollback().await.unwrap();
        assert_eq!(orchestrator.state(), MigrationState::RolledBack);
        let after = legacy.contents().unwrap();
        for key in keys::ALL_DATA {
            assert_eq!(after.get(*key), before.get(*key), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_failed_success_entry_ends_in_failed_state() {
        let manager = Arc::new(StorageManager::with_backend(Arc::new(FaultyBackend::new(false, true))));
        let legacy = legacy_from(&fixture());
        let mut orchestrator = MigrationOrchestrator::new(manager, legacy);

        let err = orchestrator.migrate().await.unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)));
        assert_eq!(orchestrator.state(), MigrationState::Failed);

        let entries = orchestrator.log().entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert!(!orchestrator.is_migrated().await);
    }
}
