// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Builds database adapters from configuration

use std::sync::Arc;

use super::{Database, DatabaseKind, SqliteDatabase};
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, Result};
use crate::tools::ReadOnlyPolicy;

/// Factory for creating database adapters
pub struct DatabaseFactory;

impl DatabaseFactory {
    /// Open the database named by `config`.
    ///
    /// Only SQLite ships an adapter; PostgreSQL and MySQL are recognized
    /// and reported as unsupported.
    pub fn open(config: &DatabaseConfig, policy: ReadOnlyPolicy) -> Result<Arc<dyn Database>> {
        let kind: DatabaseKind = config.kind.parse()?;
        Self::open_kind(kind, &config.dsn, policy)
    }

    /// Open a database of a known kind
    pub fn open_kind(
        kind: DatabaseKind,
        dsn: &str,
        policy: ReadOnlyPolicy,
    ) -> Result<Arc<dyn Database>> {
        match kind {
            DatabaseKind::Sqlite => {
                let db = SqliteDatabase::from_dsn(dsn, policy.is_enforced())?;
                Ok(Arc::new(db))
            }
            DatabaseKind::Postgresql | DatabaseKind::Mysql => Err(DatabaseError::Unsupported(
                format!("{} (this build ships the sqlite adapter only)", kind),
            )
            .into()),
        }
    }

    /// Kinds with a working adapter
    pub fn supported_kinds() -> &'static [DatabaseKind] {
        &[DatabaseKind::Sqlite]
    }
}
