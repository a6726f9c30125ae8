// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! SQLite adapter for the database capability

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, InterruptHandle, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{CellValue, ColumnInfo, Database, DatabaseKind, DbResult, ForeignKeyRef, QueryResult};
use crate::error::DatabaseError;

/// Location of a SQLite database named by a connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    Memory,
    File(PathBuf),
}

impl SqliteLocation {
    /// Parse `sqlite:///relative.db`, `sqlite:////abs.db`, `sqlite://path`,
    /// `:memory:` or a bare path.
    pub fn from_dsn(dsn: &str) -> Self {
        let trimmed = dsn.trim();
        let rest = trimmed
            .strip_prefix("sqlite:")
            .map(|r| r.strip_prefix("//").unwrap_or(r))
            .map(|r| r.strip_prefix('/').unwrap_or(r))
            .unwrap_or(trimmed);

        if rest.is_empty() || rest == ":memory:" {
            SqliteLocation::Memory
        } else {
            SqliteLocation::File(PathBuf::from(rest))
        }
    }
}

/// SQLite database behind a blocking connection
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    read_only: bool,
}

/// Progress of one blocking call, shared with the future awaiting it
#[derive(Default)]
struct CallState {
    running: AtomicBool,
    abandoned: AtomicBool,
}

/// Stops the blocking call when the awaiting future is dropped, e.g. by a
/// timeout, so the connection lock is released instead of held until the
/// statement finishes on its own.
struct AbandonGuard {
    call: Arc<CallState>,
    interrupt: Arc<InterruptHandle>,
    finished: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.call.abandoned.store(true, Ordering::SeqCst);
        if self.call.running.load(Ordering::SeqCst) {
            tracing::debug!(target: "sqlsage.database", "interrupting abandoned statement");
            self.interrupt.interrupt();
        }
    }
}

impl SqliteDatabase {
    /// Open an existing database file.
    ///
    /// With `read_only` the file is opened read-only and statements sqlite
    /// reports as writing are refused.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> DbResult<Self> {
        let path = path.as_ref();
        let access = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        let flags = access | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            DatabaseError::Execution(format!(
                "Failed to open database {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            target: "sqlsage.database",
            path = %path.display(),
            read_only,
            "opened sqlite database"
        );

        Ok(Self::from_connection(conn).with_read_only(read_only))
    }

    /// Open an empty in-memory database
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DatabaseError::Execution(format!("Failed to open in-memory database: {}", e))
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Open from a connection string
    pub fn from_dsn(dsn: &str, read_only: bool) -> DbResult<Self> {
        match SqliteLocation::from_dsn(dsn) {
            SqliteLocation::Memory => Ok(Self::open_in_memory()?.with_read_only(read_only)),
            SqliteLocation::File(path) => Self::open(path, read_only),
        }
    }

    /// Wrap an already prepared connection (read-only checks off)
    pub fn from_connection(conn: Connection) -> Self {
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            read_only: false,
        }
    }

    /// Refuse statements sqlite reports as not read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Whether writing statements are refused
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    async fn with_connection<T, F>(&self, operation: &'static str, f: F) -> DbResult<T>
    where
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let call = Arc::new(CallState::default());
        let mut guard = AbandonGuard {
            call: Arc::clone(&call),
            interrupt: Arc::clone(&self.interrupt),
            finished: false,
        };

        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| {
                DatabaseError::Execution("database connection lock poisoned".to_string())
            })?;
            call.running.store(true, Ordering::SeqCst);
            let outcome = if call.abandoned.load(Ordering::SeqCst) {
                Err(DatabaseError::Execution(format!(
                    "{} abandoned before it started",
                    operation
                )))
            } else {
                f(&conn)
            };
            call.running.store(false, Ordering::SeqCst);
            outcome
        })
        .await;
        guard.finished = true;

        result.map_err(|e| DatabaseError::Execution(format!("{} task failed: {}", operation, e)))?
    }
}

fn execution(context: &str, e: rusqlite::Error) -> DatabaseError {
    DatabaseError::Execution(format!("{}: {}", context, e))
}

fn list_tables_blocking(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .map_err(|e| execution("Failed to prepare query", e))?;

    let mut tables: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| execution("Failed to list tables", e))?
        .collect::<Result<_, _>>()
        .map_err(|e| execution("Failed to read table name", e))?;

    tables.dedup();
    Ok(tables)
}

fn describe_table_blocking(conn: &Connection, table_name: &str) -> DbResult<Vec<ColumnInfo>> {
    let mut fk_stmt = conn
        .prepare(r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?1)"#)
        .map_err(|e| execution("Failed to prepare query", e))?;
    let foreign_keys: HashMap<String, ForeignKeyRef> = fk_stmt
        .query_map(params![table_name], |row| {
            let from: String = row.get(0)?;
            let table: String = row.get(1)?;
            let to: Option<String> = row.get(2)?;
            Ok((
                from.clone(),
                ForeignKeyRef {
                    table,
                    // A NULL target means the referenced primary key.
                    column: to.unwrap_or(from),
                },
            ))
        })
        .map_err(|e| execution("Failed to read foreign keys", e))?
        .collect::<Result<_, _>>()
        .map_err(|e| execution("Failed to read foreign keys", e))?;

    let mut stmt = conn
        .prepare(
            r#"SELECT name, type, "notnull", dflt_value, pk
               FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .map_err(|e| execution("Failed to prepare query", e))?;

    let columns: Vec<ColumnInfo> = stmt
        .query_map(params![table_name], |row| {
            let name: String = row.get(0)?;
            let not_null: bool = row.get(2)?;
            let pk: u32 = row.get(4)?;
            Ok(ColumnInfo {
                foreign_key: foreign_keys.get(&name).cloned(),
                data_type: row.get(1)?,
                nullable: !not_null,
                default: row.get(3)?,
                primary_key_position: (pk > 0).then_some(pk),
                name,
            })
        })
        .map_err(|e| execution("Failed to describe table", e))?
        .collect::<Result<_, _>>()
        .map_err(|e| execution("Failed to read column", e))?;

    if columns.is_empty() {
        return Err(DatabaseError::NotFound(table_name.to_string()));
    }
    Ok(columns)
}

fn run_query_blocking(conn: &Connection, sql: &str, read_only: bool) -> DbResult<QueryResult> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DatabaseError::Execution(e.to_string()))?;

    if read_only && !stmt.readonly() {
        return Err(DatabaseError::Rejected(
            "the database reports this statement as writing; only read-only statements are allowed"
                .to_string(),
        ));
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let column_count = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt
        .query([])
        .map_err(|e| DatabaseError::Execution(e.to_string()))?;
    while let Some(row) = cursor
        .next()
        .map_err(|e| DatabaseError::Execution(e.to_string()))?
    {
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value = row
                .get_ref(index)
                .map_err(|e| DatabaseError::Execution(e.to_string()))?;
            values.push(match value {
                ValueRef::Null => CellValue::Null,
                ValueRef::Integer(i) => CellValue::Integer(i),
                ValueRef::Real(f) => CellValue::Real(f),
                ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
            });
        }
        rows.push(values);
    }

    Ok(QueryResult { columns, rows })
}

#[async_trait]
impl Database for SqliteDatabase {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.with_connection("list_tables", list_tables_blocking)
            .await
    }

    async fn describe_table(&self, table_name: &str) -> DbResult<Vec<ColumnInfo>> {
        let table_name = table_name.to_string();
        self.with_connection("describe_table", move |conn| {
            describe_table_blocking(conn, &table_name)
        })
        .await
    }

    async fn run_query(&self, sql: &str) -> DbResult<QueryResult> {
        let sql = sql.to_string();
        let read_only = self.read_only;
        self.with_connection("run_query", move |conn| {
            run_query_blocking(conn, &sql, read_only)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const RUNAWAY_QUERY: &str =
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c";

    fn film_database() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE language (
                 language_id INTEGER PRIMARY KEY,
                 name CHAR(20) NOT NULL
             );
             CREATE TABLE film (
                 film_id INTEGER PRIMARY KEY,
                 title VARCHAR(255) NOT NULL,
                 rental_rate DECIMAL(4,2) DEFAULT 4.99,
                 language_id INTEGER NOT NULL REFERENCES language(language_id),
                 poster BLOB
             );
             INSERT INTO language VALUES (1, 'English');
             INSERT INTO film VALUES (1, 'ACADEMY DINOSAUR', 0.99, 1, NULL);
             INSERT INTO film VALUES (2, 'ACE GOLDFINGER', 4.99, 1, x'0102');",
        )
        .unwrap();
        SqliteDatabase::from_connection(conn)
    }

    #[test]
    fn test_location_from_dsn() {
        assert_eq!(SqliteLocation::from_dsn(":memory:"), SqliteLocation::Memory);
        assert_eq!(
            SqliteLocation::from_dsn("sqlite://:memory:"),
            SqliteLocation::Memory
        );
        assert_eq!(
            SqliteLocation::from_dsn("sqlite:///data/sakila_master.db"),
            SqliteLocation::File(PathBuf::from("data/sakila_master.db"))
        );
        assert_eq!(
            SqliteLocation::from_dsn("sqlite:////var/db/x.db"),
            SqliteLocation::File(PathBuf::from("/var/db/x.db"))
        );
        assert_eq!(
            SqliteLocation::from_dsn("sqlite://data/x.db"),
            SqliteLocation::File(PathBuf::from("data/x.db"))
        );
        assert_eq!(
            SqliteLocation::from_dsn("plain.db"),
            SqliteLocation::File(PathBuf::from("plain.db"))
        );
    }

    #[tokio::test]
    async fn test_list_tables_sorted() {
        let db = film_database();
        let tables = db.list_tables().await.unwrap();
        assert_eq!(tables, vec!["film".to_string(), "language".to_string()]);
        assert_eq!(db.kind(), DatabaseKind::Sqlite);
    }

    #[tokio::test]
    async fn test_describe_table_columns() {
        let db = film_database();
        let columns = db.describe_table("film").await.unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["film_id", "title", "rental_rate", "language_id", "poster"]
        );
        assert_eq!(columns[0].primary_key_position, Some(1));
        assert_eq!(columns[1].data_type, "VARCHAR(255)");
        assert!(!columns[1].nullable);
        assert_eq!(columns[2].default.as_deref(), Some("4.99"));
        assert_eq!(
            columns[3].foreign_key,
            Some(ForeignKeyRef {
                table: "language".into(),
                column: "language_id".into()
            })
        );
        assert!(columns[4].nullable);
    }

    #[tokio::test]
    async fn test_describe_missing_table() {
        let db = film_database();
        let err = db.describe_table("ghost").await.unwrap_err();
        assert_eq!(err, DatabaseError::NotFound("ghost".into()));
    }

    #[tokio::test]
    async fn test_run_query_returns_typed_cells() {
        let db = film_database();
        let result = db
            .run_query("SELECT film_id, title, rental_rate, poster FROM film ORDER BY film_id")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["film_id", "title", "rental_rate", "poster"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[0][0], CellValue::Integer(1));
        assert_eq!(result.rows[0][1], CellValue::Text("ACADEMY DINOSAUR".into()));
        assert_eq!(result.rows[0][2], CellValue::Real(0.99));
        assert_eq!(result.rows[0][3], CellValue::Null);
        assert_eq!(result.rows[1][3], CellValue::Blob(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_run_query_reports_errors() {
        let db = film_database();
        let err = db.run_query("SELECT nope FROM film").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Execution(ref m) if m.contains("nope")));
    }

    #[tokio::test]
    async fn test_read_only_refuses_writes() {
        let db = film_database().with_read_only(true);
        let err = db.run_query("DELETE FROM film").await.unwrap_err();
        assert_eq!(err.kind(), "Rejected");

        let count = db.run_query("SELECT COUNT(*) FROM film").await.unwrap();
        assert_eq!(count.rows[0][0], CellValue::Integer(2));
    }

    #[tokio::test]
    async fn test_writes_allowed_without_read_only() {
        let db = film_database();
        assert!(!db.is_read_only());
        db.run_query("DELETE FROM film WHERE film_id = 2")
            .await
            .unwrap();
        let count = db.run_query("SELECT COUNT(*) FROM film").await.unwrap();
        assert_eq!(count.rows[0][0], CellValue::Integer(1));
    }

    #[tokio::test]
    async fn test_open_file_read_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shop.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT);")
                .unwrap();
        }

        let db = SqliteDatabase::open(&path, true).unwrap();
        assert!(db.is_read_only());
        assert_eq!(db.list_tables().await.unwrap(), vec!["customer".to_string()]);
    }

    #[test]
    fn test_open_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = SqliteDatabase::open(temp_dir.path().join("absent.db"), true);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_abandoned_query_releases_connection() {
        let db = film_database();

        let runaway =
            tokio::time::timeout(Duration::from_millis(100), db.run_query(RUNAWAY_QUERY)).await;
        assert!(runaway.is_err());

        let tables = tokio::time::timeout(Duration::from_secs(5), db.list_tables())
            .await
            .expect("connection still held by the abandoned query")
            .unwrap();
        assert_eq!(tables, vec!["film", "language"]);

        let count = db.run_query("SELECT COUNT(*) FROM film").await.unwrap();
        assert_eq!(count.rows[0][0], CellValue::Integer(2));
    }
}
