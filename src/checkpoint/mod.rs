// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Checkpoint storage
//!
//! Conversation state is saved after every loop step keyed by thread id.
//! The in-memory store lives as long as the process; the SQLite store
//! survives restarts. Both keep the serialized JSON bytes, so a state that
//! is loaded and saved again unchanged is byte-identical.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use crate::agent::ConversationState;
use crate::config::{CheckpointBackend, Settings};
use crate::error::Result;

mod memory;
mod sqlite;

pub use memory::MemoryCheckpointStore;
pub use sqlite::SqliteCheckpointStore;

/// Persists and restores conversation state by thread id
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest saved state of a thread, `None` if it has never been saved
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>>;

    /// Replace the saved state of a thread
    async fn save(&self, thread_id: &str, state: &ConversationState) -> Result<()>;

    /// Ids of every saved thread, sorted
    async fn threads(&self) -> Result<Vec<String>>;
}

/// Build the store selected in settings
pub fn open_store(settings: &Settings) -> Result<Arc<dyn CheckpointStore>> {
    match settings.checkpoint.backend {
        CheckpointBackend::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        CheckpointBackend::Sqlite => {
            let store = SqliteCheckpointStore::open(settings.checkpoint_path())?;
            Ok(Arc::new(store))
        }
    }
}

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per thread id, so runs on the same thread queue up
///
/// Entries only live while a run holds or waits for their thread.
#[derive(Default)]
pub struct ThreadLocks {
    locks: Mutex<LockMap>,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until no other run holds `thread_id`, then hold it until the guard drops
    pub async fn acquire(&self, thread_id: &str) -> ThreadGuard<'_> {
        let lock = self
            .map()
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let held = lock.clone().lock_owned().await;
        ThreadGuard {
            owner: self,
            thread_id: thread_id.to_string(),
            lock,
            held: Some(held),
        }
    }

    /// Whether a run currently holds `thread_id`
    pub fn is_busy(&self, thread_id: &str) -> bool {
        self.map()
            .get(thread_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of threads with a run holding or waiting for them
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one thread id
pub struct ThreadGuard<'a> {
    owner: &'a ThreadLocks,
    thread_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        let mut map = self.owner.map();
        // Waiters clone the entry under the map lock, so a count of two
        // (the map and this guard) means nobody else wants the thread
        let idle = map.get(&self.thread_id).is_some_and(|entry| {
            Arc::ptr_eq(entry, &self.lock) && Arc::strong_count(entry) == 2
        });
        if idle {
            map.remove(&self.thread_id);
        }
    }
}
