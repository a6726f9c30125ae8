// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Process-lifetime checkpoint store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::CheckpointStore;
use crate::agent::ConversationState;
use crate::error::Result;

/// Thread id to serialized state, kept in memory
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialized bytes currently saved for a thread
    pub fn raw(&self, thread_id: &str) -> Option<Vec<u8>> {
        self.states().get(thread_id).cloned()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        let bytes = self.raw(thread_id);
        bytes
            .map(|bytes| ConversationState::from_bytes(&bytes))
            .transpose()
    }

    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()> {
        // Serialize outside the lock; the entry is swapped in one assignment
        let bytes = state.to_bytes()?;
        self.states().insert(thread_id.to_string(), bytes);
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.states().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Message;

    fn sample_state(thread_id: &str) -> ConversationState {
        let mut state = ConversationState::new(thread_id);
        state.push(Message::system("sys")).unwrap();
        state.push(Message::user("List the tables")).unwrap();
        state.user_query = "List the tables".into();
        state
    }

    #[tokio::test]
    async fn test_load_missing_thread() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryCheckpointStore::new();
        let state = sample_state("t1");
        store.save("t1", &state).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_round_trip_is_byte_identical() {
        let store = MemoryCheckpointStore::new();
        store.save("t1", &sample_state("t1")).await.unwrap();
        let before = store.raw("t1").unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        store.save("t1", &loaded).await.unwrap();
        assert_eq!(store.raw("t1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_threads_sorted() {
        let store = MemoryCheckpointStore::new();
        store.save("b", &sample_state("b")).await.unwrap();
        store.save("a", &sample_state("a")).await.unwrap();
        assert_eq!(store.threads().await.unwrap(), vec!["a", "b"]);
    }
}
