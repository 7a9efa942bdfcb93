//! Structural checks on a legacy snapshot before anything is written

use std::collections::HashSet;

use crate::model::BackupSnapshot;
use crate::{Error, Result, ValidationIssue};

fn issue(entity: &'static str, id: &str, field: &'static str, reason: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        entity,
        id: id.to_string(),
        field,
        reason: reason.into(),
    }
}

fn check_amount(issues: &mut Vec<ValidationIssue>, entity: &'static str, id: &str, field: &'static str, value: f64) {
    if !value.is_finite() {
        issues.push(issue(entity, id, field, "must be a finite number"));
    } else if value < 0.0 {
        issues.push(issue(entity, id, field, format!("must not be negative (got {})", value)));
    }
}

fn check_present(issues: &mut Vec<ValidationIssue>, entity: &'static str, id: &str, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        issues.push(issue(entity, id, field, "must not be empty"));
    }
}

/// Validate a snapshot, collecting every problem into one `Error::Validation`.
///
/// Checks: ids and vehicle references present, ids unique per entity,
/// references pointing at a vehicle in the same snapshot, and amount /
/// quantity / mileage / cost finite and non-negative.
pub fn validate_snapshot(snapshot: &BackupSnapshot) -> Result<()> {
    let mut issues = Vec::new();

    let mut vehicle_ids = HashSet::new();
    for vehicle in &snapshot.vehicles {
        check_present(&mut issues, "vehicle", &vehicle.id, "id", &vehicle.id);
        check_present(&mut issues, "vehicle", &vehicle.id, "name", &vehicle.name);
        if !vehicle_ids.insert(vehicle.id.as_str()) {
            issues.push(issue("vehicle", &vehicle.id, "id", "duplicate id"));
        }
    }

    let mut seen = HashSet::new();
    for entry in &snapshot.fuel_entries {
        check_present(&mut issues, "fuel_entry", &entry.id, "id", &entry.id);
        check_present(&mut issues, "fuel_entry", &entry.id, "vehicle_id", &entry.vehicle_id);
        if !seen.insert(entry.id.as_str()) {
            issues.push(issue("fuel_entry", &entry.id, "id", "duplicate id"));
        }
        if !entry.vehicle_id.trim().is_empty() && !vehicle_ids.contains(entry.vehicle_id.as_str()) {
            issues.push(issue("fuel_entry", &entry.id, "vehicle_id", format!("unknown vehicle {}", entry.vehicle_id)));
        }
        check_amount(&mut issues, "fuel_entry", &entry.id, "amount", entry.amount);
        check_amount(&mut issues, "fuel_entry", &entry.id, "quantity", entry.quantity);
        check_amount(&mut issues, "fuel_entry", &entry.id, "mileage", entry.mileage);
    }

    let mut seen = HashSet::new();
    for record in &snapshot.service_records {
        check_present(&mut issues, "service_record", &record.id, "id", &record.id);
        check_present(&mut issues, "service_record", &record.id, "vehicle_id", &record.vehicle_id);
        if !seen.insert(record.id.as_str()) {
            issues.push(issue("service_record", &record.id, "id", "duplicate id"));
        }
        if !record.vehicle_id.trim().is_empty() && !vehicle_ids.contains(record.vehicle_id.as_str()) {
            issues.push(issue("service_record", &record.id, "vehicle_id", format!("unknown vehicle {}", record.vehicle_id)));
        }
        check_amount(&mut issues, "service_record", &record.id, "cost", record.cost);
        check_amount(&mut issues, "service_record", &record.id, "mileage", record.mileage);
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation { issues })
    }
}
