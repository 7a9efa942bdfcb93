use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::migration::CURRENT_VERSION;
use crate::storage::StorageConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaragelogConfig {
    pub database: Option<String>,
    pub legacy_store: Option<String>,
    #[serde(default = "default_migration_version")]
    pub migration_version: u32,
    #[serde(default)]
    pub force_fallback: bool,
}

fn default_migration_version() -> u32 {
    CURRENT_VERSION
}

impl Default for GaragelogConfig {
    fn default() -> Self {
        Self {
            database: None,
            legacy_store: None,
            migration_version: CURRENT_VERSION,
            force_fallback: false,
        }
    }
}

impl GaragelogConfig {
    /// Config pointing at the default `.garagelog/` files under `base`
    pub fn with_defaults_in(base: &Path) -> Self {
        Self {
            database: Some(default_database_path_in(base).to_string_lossy().into_owned()),
            legacy_store: Some(default_legacy_path_in(base).to_string_lossy().into_owned()),
            ..Self::default()
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path_in(Path::new(".")))
    }

    pub fn legacy_store_path(&self) -> PathBuf {
        self.legacy_store
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_legacy_path_in(Path::new(".")))
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            database: Some(self.database_path()),
            force_fallback: self.force_fallback,
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("garagelog.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".garagelog").join("garagelog.db")
}

pub fn default_legacy_path_in(base: &Path) -> PathBuf {
    base.join(".garagelog").join("legacy.json")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<GaragelogConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: GaragelogConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &GaragelogConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Create the parent directory of a database or legacy file if needed
pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
