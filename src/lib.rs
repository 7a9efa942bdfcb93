//! # Garagelog - vehicle log storage core
//!
//! Persistence layer for the vehicle / fuel / service tracker.
//!
//! Garagelog provides:
//! - One `execute_sql` contract over two storage backends (SQLite, or an
//!   in-memory fallback emulator when SQLite cannot be opened)
//! - A minimal statement parser and relational emulator for degraded mode
//! - A one-time, recoverable migration from the legacy key-value store
//!   (backup, validation, transactional load, verification, rollback)
//! - An append-only migration log

pub mod value;
pub mod storage;
pub mod legacy;
pub mod model;
pub mod migration;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use value::Value;
pub use storage::{BackendKind, QueryResult, Row, StorageConfig, StorageManager};
pub use legacy::{FileLegacyStore, LegacyStore, MemoryLegacyStore};
pub use model::BackupSnapshot;
pub use migration::{MigrationOrchestrator, MigrationReport, MigrationState};

/// Result type alias for Garagelog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Garagelog operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Native storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    #[error("Snapshot validation failed: {}", format_issues(.issues))]
    Validation { issues: Vec<ValidationIssue> },

    #[error("Verification mismatch in {table}: expected {expected} rows, found {actual}")]
    VerificationMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("No legacy backup found")]
    NoBackup,

    #[error("Legacy backup is corrupt: {0}")]
    CorruptBackup(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single structural problem found in a legacy snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub entity: &'static str,
    pub id: String,
    pub field: &'static str,
    pub reason: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}].{}: {}", self.entity, self.id, self.field, self.reason)
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
