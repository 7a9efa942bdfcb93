use std::path::Path;
use std::sync::Arc;

use garagelog::config::{ensure_db_dir, write_config, GaragelogConfig};
use garagelog::legacy::{FileLegacyStore, LegacyStore};
use garagelog::migration::MigrationOrchestrator;
use garagelog::ui::{self, Icons, Spinner};
use garagelog::{StorageManager, Value};

/// Services shared by the subcommands, built from the loaded config
pub struct Context {
    pub config: GaragelogConfig,
    pub manager: Arc<StorageManager>,
    pub legacy: Arc<dyn LegacyStore>,
}

impl Context {
    pub fn new(config: GaragelogConfig) -> anyhow::Result<Self> {
        let database = config.database_path();
        let legacy_path = config.legacy_store_path();
        ensure_db_dir(&database)?;
        ensure_db_dir(&legacy_path)?;

        Ok(Self {
            manager: Arc::new(StorageManager::new(config.storage_config())),
            legacy: Arc::new(FileLegacyStore::new(legacy_path)),
            config,
        })
    }

    fn orchestrator(&self) -> MigrationOrchestrator {
        MigrationOrchestrator::new(Arc::clone(&self.manager), Arc::clone(&self.legacy))
            .with_version(self.config.migration_version)
    }
}

pub fn run_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    let config = GaragelogConfig::with_defaults_in(Path::new(""));
    write_config(config_path, &config, force)?;
    ensure_db_dir(&config.database_path())?;

    ui::success(&format!("Wrote {}", config_path.display()));
    ui::summary_row("database:", &config.database_path().display().to_string());
    ui::summary_row("legacy store:", &config.legacy_store_path().display().to_string());
    Ok(())
}

pub async fn run_status(ctx: &Context) -> anyhow::Result<()> {
    let kind = ctx.manager.initialize().await;
    let orchestrator = ctx.orchestrator();
    let migrated = orchestrator.is_migrated().await;
    let backup = orchestrator.backup_store().exists().await?;

    ui::header("Garagelog status");
    ui::status(Icons::DATABASE, "Backend", &ui::backend(kind));
    ui::status(Icons::PACKAGE, "Database", &ctx.config.database_path().display().to_string());
    ui::status(Icons::PACKAGE, "Legacy store", &ctx.config.legacy_store_path().display().to_string());

    ui::section(" Storage ");
    let counts = table_counts(&ctx.manager).await?;
    let mut stats: Vec<(&str, String)> = counts.iter().map(|(t, c)| (*t, c.to_string())).collect();
    stats.push(("migration version", ctx.config.migration_version.to_string()));
    stats.push(("migrated", migrated.to_string()));
    stats.push(("backup present", backup.to_string()));
    let stats: Vec<(&str, &str)> = stats.iter().map(|(k, v)| (*k, v.as_str())).collect();
    println!("{}", ui::stats_table(&stats));

    ui::section(" Migration log ");
    println!("{}", ui::log_table(&orchestrator.log().entries().await?));

    if ctx.manager.is_degraded().await {
        ui::warn("Running on the in-memory fallback; nothing written in this session is persisted");
    }
    Ok(())
}

async fn table_counts(manager: &StorageManager) -> anyhow::Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::new();
    for table in garagelog::storage::schema::DATA_TABLES {
        let res = manager
            .execute_sql(&format!("SELECT COUNT(*) AS count FROM {}", table), &[])
            .await?;
        counts.push((*table, res.scalar_i64().unwrap_or(0)));
    }
    Ok(counts)
}

pub async fn run_migrate(ctx: &Context, clear_backup: bool) -> anyhow::Result<()> {
    let mut orchestrator = ctx.orchestrator();
    let spinner = Spinner::new("Migrating legacy store...");

    let report = match orchestrator.ensure_migrated().await {
        Ok(report) => report,
        Err(e) => {
            spinner.clear();
            ui::error(&format!("Migration failed ({})", orchestrator.state()));
            ui::summary_row("backup:", "kept; run `garagelog rollback` to restore the legacy store");
            return Err(e.into());
        }
    };

    match report {
        Some(report) => {
            spinner.finish_with_message("Migration complete");
            ui::success(&format!("Migrated legacy store (v{})", report.version));
            ui::status(Icons::DATABASE, "Backend", &ui::backend(report.backend));
            ui::summary_row(&format!("{} vehicles:", Icons::CAR), &report.vehicles.to_string());
            ui::summary_row(&format!("{} fuel entries:", Icons::FUEL), &report.fuel_entries.to_string());
            ui::summary_row(&format!("{} service records:", Icons::WRENCH), &report.service_records.to_string());
            ui::summary_row(&format!("{} settings:", Icons::GEAR), &report.settings.to_string());
            if !report.atomic {
                ui::warn("Load ran without transactional guarantees; the legacy backup is the recovery path");
            }
        }
        None => {
            spinner.clear();
            ui::info("Migration", &format!("v{} already applied", orchestrator.version()));
        }
    }

    if clear_backup {
        orchestrator.clear_backup().await?;
        ui::status(Icons::DEL, "Backup", "cleared");
    }
    Ok(())
}

pub async fn run_rollback(ctx: &Context) -> anyhow::Result<()> {
    let mut orchestrator = ctx.orchestrator();
    let snapshot = orchestrator.rollback().await?;

    ui::success("Legacy store restored from backup");
    ui::summary_row(&format!("{} vehicles:", Icons::CAR), &snapshot.vehicles.len().to_string());
    ui::summary_row(&format!("{} fuel entries:", Icons::FUEL), &snapshot.fuel_entries.len().to_string());
    ui::summary_row(&format!("{} service records:", Icons::WRENCH), &snapshot.service_records.len().to_string());
    println!("{}", ui::muted("Relational data was left in place."));
    Ok(())
}

pub async fn run_clear_backup(ctx: &Context) -> anyhow::Result<()> {
    let orchestrator = ctx.orchestrator();
    if !orchestrator.backup_store().exists().await? {
        ui::info("Backup", "none present");
        return Ok(());
    }

    orchestrator.clear_backup().await?;
    ui::status(Icons::DEL, "Backup", "cleared");
    Ok(())
}

/// Parse `--params` as a JSON array of scalars
fn parse_params(raw: Option<&str>) -> anyhow::Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("--params must be a JSON array: {}", e))?;
    Ok(values.into_iter().map(Value::from).collect())
}

pub async fn run_query(ctx: &Context, sql: &str, params: Option<&str>, json: bool) -> anyhow::Result<()> {
    let params = parse_params(params)?;
    let result = ctx.manager.execute_sql(sql, &params).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    match &result.rows {
        Some(rows) => println!("{}", ui::rows_table(rows)),
        None => {
            let mut line = format!("{} row(s) affected", result.rows_affected);
            if let Some(id) = &result.insert_id {
                line.push_str(&format!(", insert id {}", id));
            }
            ui::success(&line);
        }
    }

    if ctx.manager.is_degraded().await {
        ui::warn("Executed on the in-memory fallback; the change is not persisted");
    }
    Ok(())
}
