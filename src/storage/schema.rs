//! Database schema definitions

/// SQL to create the vehicles table
pub const CREATE_VEHICLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS vehicles (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    year INTEGER,
    make TEXT,
    model TEXT,
    type TEXT NOT NULL DEFAULT 'gas',
    status TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the fuel_entries table
pub const CREATE_FUEL_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS fuel_entries (
    id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL REFERENCES vehicles(id),
    date TEXT NOT NULL,
    amount REAL NOT NULL,
    quantity REAL NOT NULL,
    price_per_unit REAL NOT NULL,
    mileage REAL NOT NULL,
    mpg REAL,
    fuel_station TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the service_records table
pub const CREATE_SERVICE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS service_records (
    id TEXT PRIMARY KEY,
    vehicle_id TEXT NOT NULL REFERENCES vehicles(id),
    date TEXT NOT NULL,
    type TEXT NOT NULL,
    description TEXT,
    cost REAL NOT NULL,
    mileage REAL NOT NULL,
    notes TEXT,
    is_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the app_settings table
/// Flat key/value pairs, one row per setting
pub const CREATE_APP_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS app_settings (
    key TEXT PRIMARY KEY,
    value TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

/// SQL to create the migration_log table
/// Append-only: rows are never updated or deleted
pub const CREATE_MIGRATION_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migration_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL,
    success INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_fuel_entries_vehicle ON fuel_entries(vehicle_id)",
    "CREATE INDEX IF NOT EXISTS idx_fuel_entries_date ON fuel_entries(date)",
    "CREATE INDEX IF NOT EXISTS idx_service_records_vehicle ON service_records(vehicle_id)",
    "CREATE INDEX IF NOT EXISTS idx_migration_log_version ON migration_log(version)",
];

/// Connection pragmas applied when the native engine is opened
pub const CONNECTION_PRAGMAS: &[&str] = &[
    "PRAGMA journal_mode = WAL",
    "PRAGMA foreign_keys = ON",
];

/// Data tables, in foreign-key load order
pub const DATA_TABLES: &[&str] = &["vehicles", "fuel_entries", "service_records", "app_settings"];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_VEHICLES_TABLE,
        CREATE_FUEL_ENTRIES_TABLE,
        CREATE_SERVICE_RECORDS_TABLE,
        CREATE_APP_SETTINGS_TABLE,
        CREATE_MIGRATION_LOG_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
