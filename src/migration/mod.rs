//! Legacy store migration: backup, validation, load, verification and rollback

pub mod backup;
pub mod log;
pub mod orchestrator;
pub mod validate;

pub use backup::BackupStore;
pub use log::MigrationLog;
pub use orchestrator::{MigrationOrchestrator, MigrationReport, MigrationState, CURRENT_VERSION};
pub use validate::validate_snapshot;
