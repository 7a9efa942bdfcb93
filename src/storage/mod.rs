//! Storage Layer - one query contract over two backends
//!
//! System of record is SQLite (`NativeBackend`) with tables:
//! - vehicles(id, name, year, make, model, type, status, ...)
//! - fuel_entries(id, vehicle_id, date, amount, quantity, price_per_unit, mileage, ...)
//! - service_records(id, vehicle_id, date, type, description, cost, mileage, ...)
//! - app_settings(key, value)
//! - migration_log(id, version, applied_at, success)
//!
//! When SQLite cannot be opened the `FallbackBackend` emulates a small subset
//! of it in memory. Degraded mode has no foreign keys and no atomic
//! transactions; see `TransactionCoordinator`.

pub mod backend;
pub mod fallback;
pub mod manager;
pub mod schema;
pub mod sqlite;
pub mod statement;
pub mod transaction;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub use backend::StorageBackend;
pub use fallback::FallbackBackend;
pub use manager::StorageManager;
pub use sqlite::NativeBackend;
pub use statement::{Statement, StatementKind};
pub use transaction::TransactionCoordinator;

/// A result row: column name to value
pub type Row = BTreeMap<String, Value>;

/// Outcome of `execute_sql`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Present for statements that return rows
    pub rows: Option<Vec<Row>>,
    pub rows_affected: usize,
    pub insert_id: Option<Value>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Some(rows),
            ..Self::default()
        }
    }

    pub fn affected(rows_affected: usize) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Rows, or an empty slice for statements that return none
    pub fn rows(&self) -> &[Row] {
        self.rows.as_deref().unwrap_or(&[])
    }

    /// First column of the first row as an integer (for `COUNT(*)` queries)
    pub fn scalar_i64(&self) -> Option<i64> {
        self.rows().first()?.values().next()?.as_i64()
    }
}

/// Which backend is serving queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Fallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the manager should acquire its backend
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Database file for the native engine; `None` opens an in-memory database
    pub database: Option<PathBuf>,
    /// Skip the native probe and start in degraded mode
    pub force_fallback: bool,
}

impl StorageConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: Some(path.into()),
            force_fallback: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn fallback_only() -> Self {
        Self {
            database: None,
            force_fallback: true,
        }
    }
}
