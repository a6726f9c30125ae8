// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable checkpoint store backed by a SQLite file

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::CheckpointStore;
use crate::agent::ConversationState;
use crate::error::{Error, Result};

/// Checkpoints kept in a `checkpoints` table, one row per thread
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

fn store_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Checkpoint(format!("{}: {}", context, e))
}

impl SqliteCheckpointStore {
    /// Open or create the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| store_error("failed to create checkpoint directory", e))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| store_error("failed to open checkpoint store", e))?;
        Self::init(conn)
    }

    /// Store that lives only as long as the connection
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| store_error("failed to open checkpoint store", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| store_error("failed to create checkpoint schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            work(&mut guard)
        })
        .await
        .map_err(|e| store_error("checkpoint task failed", e))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let thread_id = thread_id.to_string();
        let state: Option<String> = self
            .with_connection(move |conn| {
                conn.query_row(
                    "SELECT state FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| store_error("failed to read checkpoint", e))
            })
            .await?;

        state
            .map(|text| ConversationState::from_bytes(text.as_bytes()))
            .transpose()
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        let bytes = state.to_bytes()?;
        let text = String::from_utf8(bytes).map_err(|e| store_error("invalid state text", e))?;
        let thread_id = thread_id.to_string();

        self.with_connection(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| store_error("failed to begin checkpoint write", e))?;
            tx.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)",
                params![thread_id, text, Utc::now().to_rfc3339()],
            )
            .map_err(|e| store_error("failed to write checkpoint", e))?;
            tx.commit()
                .map_err(|e| store_error("failed to commit checkpoint", e))
        })
        .await
    }

    async fn threads(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT thread_id FROM checkpoints ORDER BY thread_id")
                .map_err(|e| store_error("failed to list checkpoints", e))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
                .map_err(|e| store_error("failed to list checkpoints", e))?;
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::{ActionRequest, Message};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_state(thread_id: &str) -> ConversationState {
        let mut state = ConversationState::new(thread_id);
        state.push(Message::system("sys")).unwrap();
        state.push(Message::user("How many actors?")).unwrap();
        state
            .push(Message::assistant_with_actions(
                "",
                vec![ActionRequest::new(
                    "call_1",
                    "run_query",
                    json!({"query": "SELECT COUNT(*) FROM actor"}),
                )],
            ))
            .unwrap();
        state.step_count = 1;
        state
    }

    #[tokio::test]
    async fn test_save_and_load_in_memory() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        assert!(store.load("t1").await.unwrap().is_none());

        let state = sample_state("t1");
        store.save("t1", &state).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().unwrap(), state);
    }

    #[tokio::test]
    async fn test_save_replaces_previous() {
        let store = SqliteCheckpointStore::open_in_memory().unwrap();
        let mut state = sample_state("t1");
        store.save("t1", &state).await.unwrap();

        state
            .push(Message::tool_result("call_1", "{\"rows\":[[200]]}", false))
            .unwrap();
        store.save("t1", &state).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(store.threads().await.unwrap(), vec!["t1"]);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");
        let state = sample_state("durable");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.save("durable", &state).await.unwrap();
        }

        let reopened = SqliteCheckpointStore::open(&path).unwrap();
        let loaded = reopened.load("durable").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.to_bytes().unwrap(), state.to_bytes().unwrap());
    }
}
