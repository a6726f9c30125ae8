// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Database capability
//!
//! The agent reaches the database only through the [`Database`] trait: list
//! tables, describe one table, run one SQL statement verbatim. Adapters map
//! their native failures onto [`DatabaseError`] so the action executor can
//! report them back to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DatabaseError, Error};

mod factory;
pub mod sqlite;

pub use factory::DatabaseFactory;
pub use sqlite::SqliteDatabase;

/// Result type for database capability calls
pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// A bound database the agent can inspect and query
#[async_trait]
pub trait Database: Send + Sync {
    /// Engine kind, used to pick the SQL dialect in the prompt
    fn kind(&self) -> DatabaseKind;

    /// Table names, sorted and de-duplicated
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Ordered column descriptors; `NotFound` if the table is absent
    async fn describe_table(&self, table_name: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Run `sql` exactly as given
    async fn run_query(&self, sql: &str) -> DbResult<QueryResult>;
}

/// Supported and recognized database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
    Postgresql,
    Mysql,
}

impl DatabaseKind {
    /// Dialect label shown to the model
    pub fn dialect(&self) -> &'static str {
        match self {
            DatabaseKind::Sqlite => "SQLITE",
            DatabaseKind::Postgresql => "POSTGRESQL",
            DatabaseKind::Mysql => "MYSQL",
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Sqlite => write!(f, "sqlite"),
            DatabaseKind::Postgresql => write!(f, "postgresql"),
            DatabaseKind::Mysql => write!(f, "mysql"),
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DatabaseKind::Sqlite),
            "postgresql" | "postgres" => Ok(DatabaseKind::Postgresql),
            "mysql" => Ok(DatabaseKind::Mysql),
            other => Err(Error::Config(format!(
                "Unknown database kind '{}'. Use sqlite, postgresql or mysql.",
                other
            ))),
        }
    }
}

/// Description of one table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared type, as written in the schema
    pub data_type: String,
    /// Whether NULL is allowed
    pub nullable: bool,
    /// Default value expression, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// 1-based position within the primary key, if part of it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key_position: Option<u32>,
    /// Referenced column, if this column is a foreign key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
}

/// Target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// One value in a result row
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// JSON rendering used in tool messages; blobs are summarized
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(i) => serde_json::Value::from(*i),
            CellValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::Value::String(s.clone()),
            CellValue::Blob(bytes) => {
                serde_json::Value::String(format!("<blob {} bytes>", bytes.len()))
            }
        }
    }
}

/// Column names plus rows of a query result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    /// Number of rows returned
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
