// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session façade
//!
//! Entry point for callers: takes a question plus a run configuration,
//! seeds or resumes the thread, drives the orchestration loop and returns
//! either a transcript or an abort report. Runs on the same thread queue
//! behind a per-thread lock; runs on different threads are independent.

use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::agent::{
    build_system_prompt, AbortReason, LoopObserver, Orchestrator, ReasoningStep,
};
use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, ThreadLocks};
use crate::config::Settings;
use crate::database::Database;
use crate::error::Result;
use crate::llm::message::{last_query_sql, turn_records, Message, TurnRecord};
use crate::llm::provider::LlmProvider;
use crate::tools::{ActionExecutor, ReadOnlyPolicy, ToolContext};

mod cache;

pub use cache::CapabilityCache;

/// Fresh thread id for a conversation the caller did not name
pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Externally bound model and database
#[derive(Clone)]
pub struct Capabilities {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
    pub database: Arc<dyn Database>,
    /// Dialect label shown to the model
    pub dialect: String,
}

impl Capabilities {
    /// Bind a provider and database; the dialect follows the database kind
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        database: Arc<dyn Database>,
    ) -> Self {
        let dialect = database.kind().dialect().to_string();
        Self {
            provider,
            model: model.into(),
            database,
            dialect,
        }
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Per-run configuration
#[derive(Clone)]
pub struct RunConfig {
    pub thread_id: String,
    pub max_steps: u32,
    pub capabilities: Capabilities,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub read_only: ReadOnlyPolicy,
    pub max_result_rows: usize,
    pub cancel: Option<Arc<AtomicBool>>,
    pub observer: Option<Arc<dyn LoopObserver>>,
}

impl RunConfig {
    /// Defaults: 25 steps, 120s model timeout, 30s tool timeout, read-only
    pub fn new(thread_id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_steps: 25,
            capabilities,
            temperature: 0.0,
            max_tokens: 4096,
            model_timeout: Duration::from_secs(120),
            tool_timeout: crate::tools::DEFAULT_TOOL_TIMEOUT,
            read_only: ReadOnlyPolicy::default(),
            max_result_rows: crate::tools::DEFAULT_MAX_RESULT_ROWS,
            cancel: None,
            observer: None,
        }
    }

    /// Limits and policies taken from settings
    pub fn from_settings(
        settings: &Settings,
        thread_id: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            max_steps: settings.agent.max_steps,
            temperature: settings.provider.temperature,
            max_tokens: settings.provider.max_tokens,
            model_timeout: Duration::from_secs(settings.agent.model_timeout_secs),
            tool_timeout: Duration::from_secs(settings.agent.tool_timeout_secs),
            read_only: settings.agent.read_only,
            max_result_rows: settings.agent.max_result_rows,
            ..Self::new(thread_id, capabilities)
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_read_only(mut self, policy: ReadOnlyPolicy) -> Self {
        self.read_only = policy;
        self
    }

    pub fn with_max_result_rows(mut self, rows: usize) -> Self {
        self.max_result_rows = rows;
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Result of a run that reached a final answer
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub thread_id: String,
    /// Whole thread history, earlier turns included
    pub messages: Vec<Message>,
    /// Index of the first message appended by this run
    pub run_start: usize,
    pub final_answer: String,
    /// Last SQL the model ran during this run
    pub last_query_sql: Option<String>,
    /// Reasoning steps taken
    pub steps: u32,
}

impl Transcript {
    /// Messages appended by this run
    pub fn run_messages(&self) -> &[Message] {
        &self.messages[self.run_start.min(self.messages.len())..]
    }
}

/// Result of a run that ended without an answer
#[derive(Error, Debug, Clone, Serialize)]
#[error("{reason}")]
pub struct AbortReport {
    pub reason: AbortReason,
    /// History as far as the run got
    pub messages: Vec<Message>,
    pub last_query_sql: Option<String>,
}

impl AbortReport {
    fn new(reason: AbortReason, messages: Vec<Message>, run_start: usize) -> Self {
        let last_query_sql = last_query_sql(&messages[run_start.min(messages.len())..]);
        Self {
            reason,
            messages,
            last_query_sql,
        }
    }

    /// The single failure text shown to the user
    pub fn user_message(&self) -> String {
        match &self.reason {
            AbortReason::ModelInvocationFailed { detail } => format!(
                "The language model could not produce a response ({}). Please try again.",
                detail
            ),
            AbortReason::RecursionLimitExceeded { max_steps } => format!(
                "Stopped after {} reasoning steps without an answer. Try a more specific question or allow more steps.",
                max_steps
            ),
            AbortReason::CheckpointIo { detail } => {
                format!("The conversation could not be saved ({}).", detail)
            }
            AbortReason::Cancelled => "The request was cancelled.".to_string(),
            AbortReason::InvalidRequest { detail } => detail.clone(),
        }
    }
}

/// Runs questions against threads persisted in a checkpoint store
pub struct Session {
    store: Arc<dyn CheckpointStore>,
    locks: ThreadLocks,
}

impl Default for Session {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Session {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            locks: ThreadLocks::new(),
        }
    }

    /// Session whose threads live as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCheckpointStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Answer `user_query` on `config.thread_id`
    pub async fn run_turn(
        &self,
        user_query: &str,
        config: RunConfig,
    ) -> std::result::Result<Transcript, AbortReport> {
        let user_query = user_query.trim();
        if user_query.is_empty() {
            return Err(AbortReport::new(
                AbortReason::InvalidRequest {
                    detail: "Please enter a question.".to_string(),
                },
                Vec::new(),
                0,
            ));
        }
        if config.thread_id.trim().is_empty() {
            return Err(AbortReport::new(
                AbortReason::InvalidRequest {
                    detail: "The thread id must not be empty.".to_string(),
                },
                Vec::new(),
                0,
            ));
        }

        let _guard = self.locks.acquire(&config.thread_id).await;

        let system_prompt = build_system_prompt(&config.capabilities.dialect, config.read_only);
        let orchestrator = Self::orchestrator(&config, self.store.clone());
        let outcome = orchestrator
            .run(&config.thread_id, user_query, &system_prompt)
            .await;

        let steps = outcome.state.step_count;
        let messages = outcome.state.messages().to_vec();
        match outcome.result {
            Ok(answer) => Ok(Transcript {
                thread_id: config.thread_id,
                last_query_sql: last_query_sql(&messages[outcome.run_start..]),
                messages,
                run_start: outcome.run_start,
                final_answer: answer.content,
                steps,
            }),
            Err(reason) => Err(AbortReport::new(reason, messages, outcome.run_start)),
        }
    }

    fn orchestrator(config: &RunConfig, store: Arc<dyn CheckpointStore>) -> Orchestrator {
        let caps = &config.capabilities;
        let reasoning = ReasoningStep::new(caps.provider.clone(), &caps.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout(config.model_timeout);
        let executor = ActionExecutor::new(
            ToolContext::new(caps.database.clone())
                .with_tool_timeout(config.tool_timeout)
                .with_read_only(config.read_only)
                .with_max_result_rows(config.max_result_rows),
        );

        let mut orchestrator = Orchestrator::new(reasoning, executor, store, config.max_steps);
        if let Some(ref flag) = config.cancel {
            orchestrator = orchestrator.with_cancel_flag(flag.clone());
        }
        if let Some(ref observer) = config.observer {
            orchestrator = orchestrator.with_observer(observer.clone());
        }
        orchestrator
    }

    /// One record per question asked on a thread, oldest first
    pub async fn history(&self, thread_id: &str) -> Result<Vec<TurnRecord>> {
        Ok(self
            .store
            .load(thread_id)
            .await?
            .map(|state| turn_records(state.messages()))
            .unwrap_or_default())
    }

    /// Ids of every saved thread
    pub async fn threads(&self) -> Result<Vec<String>> {
        self.store.threads().await
    }
}
