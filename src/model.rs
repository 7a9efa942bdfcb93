//! Data model - legacy records, settings, migration log entries and the backup snapshot
//!
//! Legacy records are stored as camelCase JSON. Fields this crate does not
//! know about are kept in `extra` so writing a record back reproduces it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::storage::Row;
use crate::value::Value;

/// Powertrain of a vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    #[default]
    Gas,
    Electric,
    Hybrid,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Gas => "gas",
            VehicleType::Electric => "electric",
            VehicleType::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    #[default]
    Active,
    Inactive,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Active => "active",
            VehicleStatus::Inactive => "inactive",
        }
    }
}

/// A tracked vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub vehicle_type: Option<VehicleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VehicleStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Vehicle {
    pub const UPSERT_SQL: &'static str = "INSERT OR REPLACE INTO vehicles \
        (id, name, year, make, model, type, status, created_at, updated_at) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            year: None,
            make: None,
            model: None,
            vehicle_type: None,
            status: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Parameters for `UPSERT_SQL`; missing timestamps fall back to `now`
    pub fn params(&self, now: &str) -> Vec<Value> {
        vec![
            Value::from(self.id.as_str()),
            Value::from(self.name.as_str()),
            Value::from(self.year),
            Value::from(self.make.clone()),
            Value::from(self.model.clone()),
            Value::from(self.vehicle_type.unwrap_or_default().as_str()),
            Value::from(self.status.unwrap_or_default().as_str()),
            Value::from(self.created_at.as_deref().unwrap_or(now)),
            Value::from(self.updated_at.as_deref().unwrap_or(now)),
        ]
    }
}

/// A refuelling or charging event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelEntry {
    pub id: String,
    pub vehicle_id: String,
    pub date: String,
    pub amount: f64,
    pub quantity: f64,
    pub price_per_unit: f64,
    pub mileage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mpg: Option<f64>,
    #[serde(default, alias = "fuelStation", skip_serializing_if = "Option::is_none")]
    pub station: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl FuelEntry {
    pub const UPSERT_SQL: &'static str = "INSERT OR REPLACE INTO fuel_entries \
        (id, vehicle_id, date, amount, quantity, price_per_unit, mileage, mpg, fuel_station, notes, created_at, updated_at) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub fn new(id: impl Into<String>, vehicle_id: impl Into<String>, quantity: f64, price_per_unit: f64) -> Self {
        Self {
            id: id.into(),
            vehicle_id: vehicle_id.into(),
            date: "1970-01-01".to_string(),
            amount: quantity * price_per_unit,
            quantity,
            price_per_unit,
            mileage: 0.0,
            mpg: None,
            station: None,
            notes: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn params(&self, now: &str) -> Vec<Value> {
        vec![
            Value::from(self.id.as_str()),
            Value::from(self.vehicle_id.as_str()),
            Value::from(self.date.as_str()),
            Value::from(self.amount),
            Value::from(self.quantity),
            Value::from(self.price_per_unit),
            Value::from(self.mileage),
            Value::from(self.mpg),
            Value::from(self.station.clone()),
            Value::from(self.notes.clone()),
            Value::from(self.created_at.as_deref().unwrap_or(now)),
            Value::from(self.updated_at.as_deref().unwrap_or(now)),
        ]
    }
}

/// A maintenance or repair record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub id: String,
    pub vehicle_id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cost: f64,
    pub mileage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl ServiceRecord {
    pub const UPSERT_SQL: &'static str = "INSERT OR REPLACE INTO service_records \
        (id, vehicle_id, date, type, description, cost, mileage, notes, is_completed, created_at, updated_at) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub fn new(id: impl Into<String>, vehicle_id: impl Into<String>, service_type: impl Into<String>, cost: f64) -> Self {
        Self {
            id: id.into(),
            vehicle_id: vehicle_id.into(),
            date: "1970-01-01".to_string(),
            service_type: service_type.into(),
            description: None,
            cost,
            mileage: 0.0,
            notes: None,
            is_completed: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn params(&self, now: &str) -> Vec<Value> {
        vec![
            Value::from(self.id.as_str()),
            Value::from(self.vehicle_id.as_str()),
            Value::from(self.date.as_str()),
            Value::from(self.service_type.as_str()),
            Value::from(self.description.as_deref().unwrap_or("")),
            Value::from(self.cost),
            Value::from(self.mileage),
            Value::from(self.notes.clone()),
            Value::from(self.is_completed.unwrap_or(false)),
            Value::from(self.created_at.as_deref().unwrap_or(now)),
            Value::from(self.updated_at.as_deref().unwrap_or(now)),
        ]
    }
}

/// One row of the flat `app_settings` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
}

impl AppSetting {
    pub const UPSERT_SQL: &'static str = "INSERT OR REPLACE INTO app_settings \
        (key, value, created_at, updated_at) VALUES (?, ?, ?, ?)";

    pub fn params(&self, now: &str) -> Vec<Value> {
        vec![
            Value::from(self.key.as_str()),
            Value::from(self.value.as_str()),
            Value::from(now),
            Value::from(now),
        ]
    }
}

/// One migration attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationLogEntry {
    pub id: Option<i64>,
    pub version: u32,
    pub applied_at: String,
    pub success: bool,
}

impl MigrationLogEntry {
    /// Build from a `migration_log` row; rows without a usable version are skipped
    pub fn from_row(row: &Row) -> Option<Self> {
        let version = u32::try_from(row.get("version")?.as_i64()?).ok()?;
        Some(Self {
            id: row.get("id").and_then(Value::as_i64),
            version,
            applied_at: row.get("applied_at").map(ToString::to_string).unwrap_or_default(),
            success: row.get("success").is_some_and(Value::is_truthy),
        })
    }
}

/// Point-in-time copy of the legacy store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub fuel_entries: Vec<FuelEntry>,
    #[serde(default)]
    pub service_records: Vec<ServiceRecord>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub theme_mode: Option<String>,
    /// Legacy values exactly as read, by legacy key. Absent keys were absent
    /// in the store. `None` for snapshots not captured from a store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<BTreeMap<String, String>>,
}

impl BackupSnapshot {
    /// Settings rows derived from the snapshot (`region`, `themeMode`)
    pub fn settings(&self) -> Vec<AppSetting> {
        [("region", &self.region), ("themeMode", &self.theme_mode)]
            .into_iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|v| AppSetting {
                    key: key.to_string(),
                    value: v.clone(),
                })
            })
            .collect()
    }

    /// Expected row count per data table
    pub fn table_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("vehicles", self.vehicles.len()),
            ("fuel_entries", self.fuel_entries.len()),
            ("service_records", self.service_records.len()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
            && self.fuel_entries.is_empty()
            && self.service_records.is_empty()
            && self.region.is_none()
            && self.theme_mode.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_preserves_unknown_fields() {
        let json = r#"{"id":"v1","name":"Car","type":"hybrid","status":"active","nickname":"Blue","year":2019}"#;
        let vehicle: Vehicle = serde_json::from_str(json).unwrap();
        assert_eq!(vehicle.vehicle_type, Some(VehicleType::Hybrid));
        assert_eq!(vehicle.extra["nickname"], Json::from("Blue"));

        let back: Json = serde_json::to_value(&vehicle).unwrap();
        let original: Json = serde_json::from_str(json).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_fuel_entry_station_alias() {
        let json = r#"{"id":"f1","vehicleId":"v1","date":"2024-01-02","amount":40.0,"quantity":10.0,
            "pricePerUnit":4.0,"mileage":1200,"fuelStation":"Shell"}"#;
        let entry: FuelEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.station.as_deref(), Some("Shell"));
        assert_eq!(entry.params("now")[8], Value::from("Shell"));
    }

    #[test]
    fn test_service_record_params() {
        let mut record = ServiceRecord::new("s1", "v1", "oil", 59.5);
        record.is_completed = Some(true);
        let params = record.params("2024-01-01T00:00:00Z");
        assert_eq!(params.len(), 11);
        assert_eq!(params[8], Value::Integer(1));
        assert_eq!(params[9], Value::from("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_snapshot_settings() {
        let snapshot = BackupSnapshot {
            region: Some("US".to_string()),
            ..BackupSnapshot::default()
        };
        let settings = snapshot.settings();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].key, "region");
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn test_log_entry_from_row() {
        let row = Row::from([
            ("id".to_string(), Value::Integer(3)),
            ("version".to_string(), Value::Integer(1)),
            ("applied_at".to_string(), Value::from("2024-01-01T00:00:00Z")),
            ("success".to_string(), Value::Integer(0)),
        ]);
        let entry = MigrationLogEntry::from_row(&row).unwrap();
        assert_eq!(entry.id, Some(3));
        assert_eq!(entry.version, 1);
        assert!(!entry.success);
    }
}
