//! Storage manager - backend selection and the `execute_sql` contract
//!
//! The manager is the only owner of a backend. Everything else (the migration
//! orchestrator, the domain services) goes through `execute_sql` or
//! `transaction()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::value::Value;
use crate::{Error, Result};
use super::backend::StorageBackend;
use super::fallback::FallbackBackend;
use super::sqlite::NativeBackend;
use super::transaction::TransactionCoordinator;
use super::{BackendKind, QueryResult, StorageConfig};

/// Selects a backend once and routes every statement through it
pub struct StorageManager {
    config: StorageConfig,
    /// The selected backend. The async mutex doubles as the single in-flight
    /// initialization guard: concurrent `initialize()` calls queue on it.
    active: Mutex<Option<Arc<dyn StorageBackend>>>,
    selections: AtomicUsize,
    demotions: AtomicUsize,
}

impl StorageManager {
    /// Create an uninitialized manager
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
            selections: AtomicUsize::new(0),
            demotions: AtomicUsize::new(0),
        }
    }

    /// Create a manager around an already-constructed backend
    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config: StorageConfig::default(),
            active: Mutex::new(Some(backend)),
            selections: AtomicUsize::new(1),
            demotions: AtomicUsize::new(0),
        }
    }

    /// Select a backend. Idempotent: later calls return the existing selection.
    ///
    /// Never fails. If the native engine cannot be opened the manager runs on
    /// the fallback emulator for the rest of its life (until `dispose`).
    pub async fn initialize(&self) -> BackendKind {
        self.backend().await.kind()
    }

    async fn backend(&self) -> Arc<dyn StorageBackend> {
        let mut active = self.active.lock().await;
        if let Some(backend) = active.as_ref() {
            return Arc::clone(backend);
        }

        let backend = self.select_backend();
        self.selections.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Storage initialized with {} backend", backend.kind());
        *active = Some(Arc::clone(&backend));
        backend
    }

    fn select_backend(&self) -> Arc<dyn StorageBackend> {
        if self.config.force_fallback {
            tracing::info!("Native engine disabled by configuration");
            return Arc::new(FallbackBackend::new());
        }

        let opened = match &self.config.database {
            Some(path) => NativeBackend::open(path),
            None => NativeBackend::open_in_memory(),
        };

        match opened {
            Ok(native) => Arc::new(native),
            Err(e) => {
                let err = Error::BackendUnavailable(e.to_string());
                tracing::warn!("{}; continuing in degraded mode", err);
                Arc::new(FallbackBackend::new())
            }
        }
    }

    /// Execute one statement against the active backend.
    ///
    /// Initializes on first use. If the native engine fails mid-session the
    /// manager switches to the fallback emulator and re-issues the same call
    /// there, so the write is not dropped. Statement-level errors
    /// (constraint violations, bad SQL) are returned as-is.
    pub async fn execute_sql(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let backend = self.backend().await;

        match backend.execute(sql, params).await {
            Err(Error::QueryExecution(reason)) if backend.kind() == BackendKind::Native => {
                tracing::warn!(
                    "{}; demoting to fallback and retrying",
                    Error::QueryExecution(reason)
                );
                let fallback = self.demote(&backend).await;
                fallback.execute(sql, params).await
            }
            result => result,
        }
    }

    async fn demote(&self, failed: &Arc<dyn StorageBackend>) -> Arc<dyn StorageBackend> {
        let mut active = self.active.lock().await;

        // Another caller may have demoted already
        if let Some(current) = active.as_ref() {
            if !Arc::ptr_eq(current, failed) {
                return Arc::clone(current);
            }
        }

        if let Err(e) = failed.close().await {
            tracing::warn!("Failed to close native engine after failure: {}", e);
        }

        let fallback: Arc<dyn StorageBackend> = Arc::new(FallbackBackend::new());
        *active = Some(Arc::clone(&fallback));
        self.demotions.fetch_add(1, Ordering::SeqCst);
        fallback
    }

    /// Begin/commit/rollback helper bound to this manager
    pub fn transaction(&self) -> TransactionCoordinator<'_> {
        TransactionCoordinator::new(self)
    }

    /// Active backend kind, `None` before initialization
    pub async fn backend_kind(&self) -> Option<BackendKind> {
        self.active.lock().await.as_ref().map(|b| b.kind())
    }

    /// True when running on the fallback emulator
    pub async fn is_degraded(&self) -> bool {
        self.backend_kind().await == Some(BackendKind::Fallback)
    }

    /// Whether the active backend gives atomic transactions
    pub async fn supports_transactions(&self) -> bool {
        self.backend().await.supports_transactions()
    }

    /// Number of backend selections made (1 after any number of `initialize` calls)
    pub fn selection_count(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }

    /// Number of native-to-fallback switches after a mid-session failure
    pub fn demotion_count(&self) -> usize {
        self.demotions.load(Ordering::SeqCst)
    }

    /// Release the underlying handle but keep the selection.
    ///
    /// Later native calls fail and demote to the fallback.
    pub async fn close(&self) -> Result<()> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(backend) => backend.close().await,
            None => Ok(()),
        }
    }

    /// Close and forget the backend so the next `initialize` probes again
    pub async fn dispose(&self) -> Result<()> {
        let backend = self.active.lock().await.take();
        match backend {
            Some(backend) => backend.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Native-looking backend whose engine is gone
    struct BrokenNative;

    #[async_trait]
    impl StorageBackend for BrokenNative {
        fn kind(&self) -> BackendKind {
            BackendKind::Native
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            Err(Error::QueryExecution("disk I/O error".to_string()))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_initialize_twice_selects_once() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        assert_eq!(manager.initialize().await, BackendKind::Native);
        assert_eq!(manager.initialize().await, BackendKind::Native);
        assert_eq!(manager.selection_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_selects_once() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        let (a, b, c) = tokio::join!(manager.initialize(), manager.initialize(), manager.initialize());
        assert_eq!((a, b, c), (BackendKind::Native, BackendKind::Native, BackendKind::Native));
        assert_eq!(manager.selection_count(), 1);
    }

    #[tokio::test]
    async fn test_unopenable_database_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("garagelog.db");
        let manager = StorageManager::new(StorageConfig::file(path));

        assert_eq!(manager.initialize().await, BackendKind::Fallback);
        assert!(manager.is_degraded().await);
        assert!(!manager.supports_transactions().await);
    }

    #[tokio::test]
    async fn test_force_fallback() {
        let manager = StorageManager::new(StorageConfig::fallback_only());
        assert_eq!(manager.initialize().await, BackendKind::Fallback);
    }

    #[tokio::test]
    async fn test_execute_sql_initializes_lazily() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        assert_eq!(manager.backend_kind().await, None);

        manager.execute_sql("SELECT * FROM vehicles", &[]).await.unwrap();
        assert_eq!(manager.backend_kind().await, Some(BackendKind::Native));
    }

    #[tokio::test]
    async fn test_native_failure_demotes_and_reissues_write() {
        let manager = StorageManager::with_backend(Arc::new(BrokenNative));

        let res = manager
            .execute_sql(
                "INSERT INTO vehicles (id, name) VALUES (?, ?)",
                &[Value::from("v1"), Value::from("Car")],
            )
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        assert_eq!(manager.demotion_count(), 1);
        assert!(manager.is_degraded().await);

        let res = manager
            .execute_sql("SELECT * FROM vehicles WHERE id = ?", &[Value::from("v1")])
            .await
            .unwrap();
        assert_eq!(res.rows()[0]["name"], Value::from("Car"));
    }

    #[tokio::test]
    async fn test_statement_error_does_not_demote() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        let err = manager.execute_sql("SELECT * FROM no_such_table", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(manager.backend_kind().await, Some(BackendKind::Native));
        assert_eq!(manager.demotion_count(), 0);
    }

    #[tokio::test]
    async fn test_close_then_query_demotes() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        manager.initialize().await;
        manager.close().await.unwrap();

        let res = manager.execute_sql("SELECT * FROM vehicles", &[]).await.unwrap();
        assert!(res.rows().is_empty());
        assert!(manager.is_degraded().await);
    }

    #[tokio::test]
    async fn test_dispose_allows_reinitialization() {
        let manager = StorageManager::new(StorageConfig::in_memory());
        manager.initialize().await;
        manager.dispose().await.unwrap();
        assert_eq!(manager.backend_kind().await, None);

        manager.initialize().await;
        assert_eq!(manager.selection_count(), 2);
    }
}
