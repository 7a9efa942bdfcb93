//! SQLite storage implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, params_from_iter};

use crate::value::Value;
use crate::{Error, Result};
use super::backend::StorageBackend;
use super::statement::{classify, Statement, StatementKind};
use super::{schema, BackendKind, QueryResult, Row};

/// SQLite-backed native engine
///
/// The connection sits behind a `std::sync::Mutex`; it is never held across an
/// `.await`, so calls are effectively serialized on the caller's task.
pub struct NativeBackend {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl NativeBackend {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        for pragma in schema::CONNECTION_PRAGMAS {
            conn.execute_batch(pragma)?;
        }
        for stmt in schema::all_schema_statements() {
            conn.execute(stmt, [])?;
        }
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path,
        })
    }

    /// Database file, `None` for in-memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn run(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<QueryResult> {
        match classify(sql) {
            StatementKind::Read => Self::query_rows(conn, sql, params),
            StatementKind::Write => {
                let changes = conn.execute(sql, params_from_iter(params.iter()))?;
                Ok(QueryResult {
                    rows: None,
                    rows_affected: changes,
                    insert_id: Self::insert_id(conn, sql, params),
                })
            }
            StatementKind::Schema | StatementKind::Transaction => {
                conn.execute(sql, params_from_iter(params.iter()))?;
                Ok(QueryResult::empty())
            }
            // PRAGMA and anything unrecognised: let the prepared statement decide
            StatementKind::Pragma | StatementKind::Other => {
                let returns_rows = conn.prepare(sql)?.column_count() > 0;
                if returns_rows {
                    Self::query_rows(conn, sql, params)
                } else {
                    let changes = conn.execute(sql, params_from_iter(params.iter()))?;
                    Ok(QueryResult::affected(changes))
                }
            }
        }
    }

    fn query_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<QueryResult> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut map = Row::new();
            for (i, name) in columns.iter().enumerate() {
                map.insert(name.clone(), row.get::<_, Value>(i)?);
            }
            out.push(map);
        }
        Ok(QueryResult::with_rows(out))
    }

    /// The inserted row's `id` when the statement supplied one, otherwise the rowid
    fn insert_id(conn: &Connection, sql: &str, params: &[Value]) -> Option<Value> {
        match Statement::parse(sql) {
            Statement::Insert { columns, values, .. } => Some(
                columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case("id"))
                    .map(|i| values[i].resolve(params))
                    .unwrap_or_else(|| Value::Integer(conn.last_insert_rowid())),
            ),
            _ => None,
        }
    }
}

/// Whether an error means the engine itself is unusable, as opposed to the
/// statement being rejected (constraint, syntax, missing table).
fn is_engine_failure(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::NotADatabase
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
                | ErrorCode::ReadOnly
                | ErrorCode::PermissionDenied
                | ErrorCode::ApiMisuse
                | ErrorCode::InternalMalfunction
        ),
        _ => false,
    }
}

fn classify_error(err: rusqlite::Error) -> Error {
    if is_engine_failure(&err) {
        Error::QueryExecution(err.to_string())
    } else {
        Error::Storage(err)
    }
}

#[async_trait]
impl StorageBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let guard = self
            .conn
            .lock()
            .map_err(|_| Error::QueryExecution("connection lock poisoned".to_string()))?;
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::QueryExecution("connection is closed".to_string()))?;

        tracing::debug!("native: {:?} {}", classify(sql), sql.trim());
        Self::run(conn, sql, params).map_err(classify_error)
    }

    async fn close(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Connection("connection lock poisoned".to_string()))?
            .take();

        match conn {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| Error::Connection(e.to_string())),
            None => Ok(()),
        }
    }
}
