//! Storage backend strategy
//!
//! The manager selects one implementation at startup (or after a native
//! failure) and routes every statement through it.

use async_trait::async_trait;

use crate::Result;
use crate::value::Value;
use super::{BackendKind, QueryResult};

/// A relational backend able to run the crate's statement contract.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// Whether BEGIN/COMMIT/ROLLBACK give real atomicity
    fn supports_transactions(&self) -> bool {
        self.kind() == BackendKind::Native
    }

    /// Execute one statement with positional parameters.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Release any underlying handle. Further calls may fail.
    async fn close(&self) -> Result<()>;
}
