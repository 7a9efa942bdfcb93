//! Transaction coordinator
//!
//! Issues BEGIN / COMMIT / ROLLBACK through the manager.
//!
//! On the native engine these are real transactions. On the fallback emulator
//! they are accepted and do nothing: every statement is applied immediately and
//! ROLLBACK cannot undo it. Code that needs all-or-nothing behaviour in
//! degraded mode must keep its own recovery copy (the migration orchestrator
//! uses the legacy backup for this) and check `is_atomic()` before relying on
//! `rollback()`.

use crate::Result;
use super::manager::StorageManager;

/// Begin/commit/rollback wrapper over `StorageManager::execute_sql`
pub struct TransactionCoordinator<'a> {
    manager: &'a StorageManager,
    open: bool,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(manager: &'a StorageManager) -> Self {
        Self { manager, open: false }
    }

    /// Whether a rollback on the active backend actually discards writes
    pub async fn is_atomic(&self) -> bool {
        self.manager.supports_transactions().await
    }

    /// Whether `begin` has been called without a matching commit/rollback
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub async fn begin(&mut self) -> Result<()> {
        self.manager.execute_sql("BEGIN TRANSACTION", &[]).await?;
        self.open = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.manager.execute_sql("COMMIT", &[]).await?;
        self.open = false;
        Ok(())
    }

    /// Roll back the open transaction.
    ///
    /// In degraded mode this is a no-op; see the module docs.
    pub async fn rollback(&mut self) -> Result<()> {
        if !self.is_atomic().await {
            tracing::warn!("Rollback requested on a non-atomic backend; applied writes remain");
        }
        self.open = false;
        self.manager.execute_sql("ROLLBACK", &[]).await?;
        Ok(())
    }
}
