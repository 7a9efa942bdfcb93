//! In-memory fallback emulator
//!
//! Interprets the `Statement` subset against `table -> Vec<Row>` maps. Tables
//! spring into existence on first write; DDL and PRAGMA are accepted and ignored.
//!
//! Limitations in degraded mode:
//! - no foreign keys: fuel entries may point at vehicles that do not exist
//! - no primary keys: a plain INSERT with a duplicate id appends a second row
//! - BEGIN/COMMIT/ROLLBACK are accepted but every write applies immediately
//!
//! Statements outside the subset return an empty success and never fail.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::value::Value;
use crate::{Error, Result};
use super::backend::StorageBackend;
use super::statement::{Conflict, Operand, Predicate, Projection, Statement};
use super::{BackendKind, QueryResult, Row};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    /// Last synthesized id per table
    sequences: HashMap<String, i64>,
}

/// In-memory relational emulator
#[derive(Debug, Default)]
pub struct FallbackBackend {
    tables: Mutex<Tables>,
}

fn now_timestamp() -> Value {
    Value::Text(chrono::Utc::now().to_rfc3339())
}

fn matches(row: &Row, predicate: Option<&(String, Value)>) -> bool {
    match predicate {
        None => true,
        Some((column, target)) => row.get(column).is_some_and(|v| v.sql_eq(target)),
    }
}

fn bind(predicate: Option<Predicate>, params: &[Value]) -> Option<(String, Value)> {
    predicate.map(|p| {
        let value = p.operand.resolve(params);
        (p.column, value)
    })
}

impl Tables {
    fn next_id(&mut self, table: &str) -> i64 {
        let highest = self
            .rows
            .get(table)
            .into_iter()
            .flatten()
            .filter_map(|row| match row.get("id") {
                Some(Value::Integer(i)) => Some(*i),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let seq = self.sequences.entry(table.to_string()).or_insert(0);
        *seq = (*seq).max(highest) + 1;
        *seq
    }

    fn insert(
        &mut self,
        table: String,
        columns: Vec<String>,
        values: Vec<Operand>,
        conflict: Conflict,
        params: &[Value],
    ) -> QueryResult {
        let mut row = Row::new();
        for (column, operand) in columns.iter().zip(&values) {
            row.insert(column.clone(), operand.resolve(params));
        }

        let has_id = row.get("id").is_some_and(|v| !v.is_null());
        if !has_id {
            let id = self.next_id(&table);
            row.insert("id".to_string(), Value::Integer(id));
        }

        let now = now_timestamp();
        for stamp in ["created_at", "updated_at"] {
            if row.get(stamp).is_none_or(Value::is_null) {
                row.insert(stamp.to_string(), now.clone());
            }
        }

        let rows = self.rows.entry(table).or_default();

        // Conflict target: the id when the caller supplied one, else the first listed column
        let key_column = if has_id { Some("id") } else { columns.first().map(String::as_str) };
        if let (Some(key), Conflict::Replace | Conflict::Ignore) = (key_column, conflict) {
            let key_value = row.get(key).cloned().unwrap_or(Value::Null);
            let exists = |r: &Row| r.get(key).is_some_and(|v| v.sql_eq(&key_value));
            if conflict == Conflict::Ignore && rows.iter().any(exists) {
                return QueryResult::affected(0);
            }
            rows.retain(|r| !exists(r));
        }

        let insert_id = row.get("id").cloned();
        rows.push(row);
        QueryResult {
            rows: None,
            rows_affected: 1,
            insert_id,
        }
    }

    fn select(&self, table: &str, projection: Projection, predicate: Option<(String, Value)>) -> QueryResult {
        let matching = self
            .rows
            .get(table)
            .into_iter()
            .flatten()
            .filter(|row| matches(row, predicate.as_ref()));

        let rows = match projection {
            Projection::All => matching.cloned().collect(),
            Projection::Columns(columns) => matching
                .map(|row| {
                    columns
                        .iter()
                        .map(|c| (c.clone(), row.get(&c.to_ascii_lowercase()).cloned().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect(),
            Projection::Count { alias } => {
                let count = matching.count() as i64;
                vec![Row::from([(alias, Value::Integer(count))])]
            }
        };

        QueryResult::with_rows(rows)
    }

    fn update(
        &mut self,
        table: &str,
        assignments: Vec<(String, Operand)>,
        predicate: Option<(String, Value)>,
        params: &[Value],
    ) -> QueryResult {
        let assignments: Vec<(String, Value)> = assignments
            .into_iter()
            .map(|(column, operand)| (column, operand.resolve(params)))
            .collect();
        let restamp = !assignments.iter().any(|(c, _)| c == "updated_at");
        let now = now_timestamp();

        let mut affected = 0;
        for row in self.rows.get_mut(table).into_iter().flatten() {
            if !matches(row, predicate.as_ref()) {
                continue;
            }
            for (column, value) in &assignments {
                row.insert(column.clone(), value.clone());
            }
            if restamp {
                row.insert("updated_at".to_string(), now.clone());
            }
            affected += 1;
        }

        QueryResult::affected(affected)
    }

    fn delete(&mut self, table: &str, predicate: Option<(String, Value)>) -> QueryResult {
        let Some(rows) = self.rows.get_mut(table) else {
            return QueryResult::affected(0);
        };

        let before = rows.len();
        match predicate {
            None => rows.clear(),
            Some(ref p) => rows.retain(|row| !matches(row, Some(p))),
        }
        QueryResult::affected(before - rows.len())
    }
}

impl FallbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::QueryExecution("fallback tables lock poisoned".to_string()))
    }

    /// Run a parsed statement
    pub fn apply(&self, stmt: Statement, params: &[Value]) -> Result<QueryResult> {
        let mut tables = self.lock()?;

        let result = match stmt {
            Statement::Insert { table, columns, values, conflict } => {
                tables.insert(table, columns, values, conflict, params)
            }
            Statement::Select { table, projection, predicate } => {
                tables.select(&table, projection, bind(predicate, params))
            }
            Statement::Update { table, assignments, predicate } => {
                let predicate = bind(predicate, params);
                tables.update(&table, assignments, predicate, params)
            }
            Statement::Delete { table, predicate } => tables.delete(&table, bind(predicate, params)),
            Statement::Transaction(control) => {
                tracing::debug!("fallback: {:?} accepted without atomicity", control);
                QueryResult::empty()
            }
            Statement::Schema => QueryResult::empty(),
            Statement::Unsupported(reason) => {
                tracing::debug!("fallback: ignoring unsupported statement ({})", reason);
                QueryResult::empty()
            }
        };

        Ok(result)
    }
}

#[async_trait]
impl StorageBackend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.apply(Statement::parse(sql), params)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_vehicle(db: &FallbackBackend, id: &str, name: &str) -> QueryResult {
        db.execute(
            "INSERT INTO vehicles (id, name) VALUES (?, ?)",
            &[Value::from(id), Value::from(name)],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_select_round_trip() {
        let db = FallbackBackend::new();
        let res = insert_vehicle(&db, "v1", "Car").await;
        assert_eq!(res.rows_affected, 1);
        assert_eq!(res.insert_id, Some(Value::from("v1")));

        let res = db
            .execute("SELECT * FROM vehicles WHERE id = ?", &[Value::from("v1")])
            .await
            .unwrap();
        assert_eq!(res.rows().len(), 1);
        assert_eq!(res.rows()[0]["name"], Value::from("Car"));
        assert!(res.rows()[0].contains_key("created_at"));
        assert!(res.rows()[0].contains_key("updated_at"));
    }

    #[tokio::test]
    async fn test_insert_synthesizes_ids() {
        let db = FallbackBackend::new();
        let sql = "INSERT INTO migration_log (version, applied_at, success) VALUES (?, ?, ?)";
        let first = db.execute(sql, &[Value::from(1), Value::from("t"), Value::from(false)]).await.unwrap();
        let second = db.execute(sql, &[Value::from(1), Value::from("t"), Value::from(true)]).await.unwrap();
        assert_eq!(first.insert_id, Some(Value::Integer(1)));
        assert_eq!(second.insert_id, Some(Value::Integer(2)));
    }

    #[tokio::test]
    async fn test_select_without_where_returns_all() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v2", "Truck").await;

        let res = db.execute("SELECT * FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.rows().len(), 2);
        assert_eq!(res.rows()[1]["name"], Value::from("Truck"));

        let res = db.execute("SELECT * FROM missing_table", &[]).await.unwrap();
        assert!(res.rows().is_empty());
    }

    #[tokio::test]
    async fn test_select_projection_and_count() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v2", "Truck").await;

        let res = db.execute("SELECT name FROM vehicles WHERE id = 'v2'", &[]).await.unwrap();
        assert_eq!(res.rows()[0].len(), 1);
        assert_eq!(res.rows()[0]["name"], Value::from("Truck"));

        let res = db.execute("SELECT COUNT(*) AS count FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.scalar_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_update_with_and_without_where() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v2", "Truck").await;

        let res = db
            .execute(
                "UPDATE vehicles SET name = ?, status = ? WHERE id = ?",
                &[Value::from("Sedan"), Value::from("inactive"), Value::from("v1")],
            )
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 1);

        let res = db.execute("SELECT * FROM vehicles WHERE id = ?", &[Value::from("v1")]).await.unwrap();
        assert_eq!(res.rows()[0]["name"], Value::from("Sedan"));
        assert_eq!(res.rows()[0]["status"], Value::from("inactive"));

        let res = db.execute("UPDATE vehicles SET status = 'active'", &[]).await.unwrap();
        assert_eq!(res.rows_affected, 2);
    }

    #[tokio::test]
    async fn test_delete_without_where_clears_table() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v2", "Truck").await;
        insert_vehicle(&db, "v3", "Bike").await;

        let res = db.execute("DELETE FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.rows_affected, 3);

        let res = db.execute("SELECT * FROM vehicles", &[]).await.unwrap();
        assert!(res.rows().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_where_removes_only_matches() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v2", "Truck").await;

        let res = db.execute("DELETE FROM vehicles WHERE id = ?", &[Value::from("v1")]).await.unwrap();
        assert_eq!(res.rows_affected, 1);

        let res = db.execute("SELECT * FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.rows().len(), 1);
        assert_eq!(res.rows()[0]["id"], Value::from("v2"));
    }

    #[tokio::test]
    async fn test_plain_insert_does_not_enforce_keys() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;
        insert_vehicle(&db, "v1", "Car again").await;

        let res = db.execute("SELECT COUNT(*) FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.scalar_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_insert_or_replace_upserts() {
        let db = FallbackBackend::new();
        let sql = "INSERT OR REPLACE INTO app_settings (key, value) VALUES (?, ?)";
        db.execute(sql, &[Value::from("region"), Value::from("US")]).await.unwrap();
        db.execute(sql, &[Value::from("region"), Value::from("EU")]).await.unwrap();

        let res = db.execute("SELECT * FROM app_settings", &[]).await.unwrap();
        assert_eq!(res.rows().len(), 1);
        assert_eq!(res.rows()[0]["value"], Value::from("EU"));
    }

    #[tokio::test]
    async fn test_unsupported_and_schema_are_noops() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;

        for sql in [
            "CREATE TABLE IF NOT EXISTS vehicles (id TEXT PRIMARY KEY)",
            "PRAGMA journal_mode = WAL",
            "SELECT * FROM vehicles v JOIN fuel_entries f ON f.vehicle_id = v.id",
            "DELETE FROM vehicles WHERE id = ? OR name = ?",
            "VACUUM",
            "this is not sql at all",
        ] {
            let res = db.execute(sql, &[Value::from("v1"), Value::from("Car")]).await.unwrap();
            assert_eq!(res.rows_affected, 0, "{}", sql);
            assert!(res.rows().is_empty(), "{}", sql);
        }

        let res = db.execute("SELECT COUNT(*) FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.scalar_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_rollback_does_not_undo_writes() {
        let db = FallbackBackend::new();
        db.execute("BEGIN TRANSACTION", &[]).await.unwrap();
        insert_vehicle(&db, "v1", "Car").await;
        db.execute("ROLLBACK", &[]).await.unwrap();

        let res = db.execute("SELECT COUNT(*) FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.scalar_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_column_names_are_case_insensitive() {
        let db = FallbackBackend::new();
        insert_vehicle(&db, "v1", "Car").await;

        let res = db
            .execute("SELECT Name FROM Vehicles WHERE ID = ?", &[Value::from("v1")])
            .await
            .unwrap();
        assert_eq!(res.rows().len(), 1);
        assert_eq!(res.rows()[0]["Name"], Value::from("Car"));

        let res = db
            .execute("UPDATE vehicles SET NAME = ? WHERE Id = ?", &[Value::from("Van"), Value::from("v1")])
            .await
            .unwrap();
        assert_eq!(res.rows_affected, 1);
        let res = db.execute("SELECT name FROM vehicles", &[]).await.unwrap();
        assert_eq!(res.rows()[0]["name"], Value::from("Van"));
    }
}
