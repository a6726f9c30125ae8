// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The orchestration loop
//!
//! An explicit state machine:
//!
//! ```text
//! Seeding -> Reasoning -> (Acting -> Reasoning)* -> Completed | Aborted
//! ```
//!
//! State is checkpointed after seeding, after every reasoning step and after
//! every batch of actions. A failure after a save leaves the last saved
//! state untouched, so a thread can always be resumed.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::reasoning::ReasoningStep;
use super::state::{ConversationState, NOT_EXECUTED_NOTICE};
use crate::checkpoint::CheckpointStore;
use crate::llm::message::{ActionRequest, Message};
use crate::tools::ActionExecutor;

/// Tool message content for actions skipped because the run was cancelled
pub const CANCELLED_NOTICE: &str = "cancelled: the run was stopped before this action ran";

/// Why a run ended without a final answer
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    #[error("model invocation failed: {detail}")]
    ModelInvocationFailed { detail: String },

    #[error("reached the limit of {max_steps} reasoning steps")]
    RecursionLimitExceeded { max_steps: u32 },

    #[error("checkpoint failure: {detail}")]
    CheckpointIo { detail: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid request: {detail}")]
    InvalidRequest { detail: String },
}

/// Position of the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Seeding,
    Reasoning,
    Acting,
    Completed,
    Aborted(AbortReason),
}

/// Progress hooks; observers see events but cannot steer the loop
pub trait LoopObserver: Send + Sync {
    fn on_reasoning(&self, _step: u32, _max_steps: u32) {}

    fn on_action(&self, _request: &ActionRequest) {}

    fn on_action_result(&self, _request: &ActionRequest, _result: &Message) {}

    fn on_complete(&self, _answer: &Message) {}

    fn on_abort(&self, _reason: &AbortReason) {}
}

/// What a run left behind
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Thread state as last reached (and, unless the store failed, saved)
    pub state: ConversationState,
    /// Index of the first message appended by this run
    pub run_start: usize,
    /// Final assistant message, or why there is none
    pub result: std::result::Result<Message, AbortReason>,
}

/// Drives one run of a thread to completion or abort
pub struct Orchestrator {
    reasoning: ReasoningStep,
    executor: ActionExecutor,
    store: Arc<dyn CheckpointStore>,
    max_steps: u32,
    cancel: Option<Arc<AtomicBool>>,
    observer: Option<Arc<dyn LoopObserver>>,
}

impl Orchestrator {
    pub fn new(
        reasoning: ReasoningStep,
        executor: ActionExecutor,
        store: Arc<dyn CheckpointStore>,
        max_steps: u32,
    ) -> Self {
        Self {
            reasoning,
            executor,
            store,
            max_steps,
            cancel: None,
            observer: None,
        }
    }

    /// Abort at the next safe point once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LoopObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn notify(&self, event: impl FnOnce(&dyn LoopObserver)) {
        if let Some(ref observer) = self.observer {
            event(observer.as_ref());
        }
    }

    /// Run `user_query` on `thread_id` until a final answer or an abort
    pub async fn run(&self, thread_id: &str, user_query: &str, system_prompt: &str) -> LoopOutcome {
        let mut state = ConversationState::new(thread_id);
        let mut run_start = 0;
        let mut current = LoopState::Seeding;

        tracing::info!(
            target: "sqlsage.loop",
            thread_id,
            max_steps = self.max_steps,
            "run started"
        );

        loop {
            current = match current {
                LoopState::Seeding => {
                    match self.seed(thread_id, user_query, system_prompt).await {
                        Ok((seeded, start)) => {
                            state = seeded;
                            run_start = start;
                            LoopState::Reasoning
                        }
                        Err(reason) => LoopState::Aborted(reason),
                    }
                }
                LoopState::Reasoning => self.reason(&mut state).await,
                LoopState::Acting => self.act(&mut state).await,
                LoopState::Completed => {
                    let result = match state.latest_assistant() {
                        Some(answer) => {
                            self.notify(|o| o.on_complete(answer));
                            Ok(answer.clone())
                        }
                        None => Err(AbortReason::InvalidRequest {
                            detail: "run completed without an assistant message".to_string(),
                        }),
                    };
                    tracing::info!(
                        target: "sqlsage.loop",
                        thread_id,
                        steps = state.step_count,
                        messages = state.len(),
                        "run completed"
                    );
                    return LoopOutcome {
                        state,
                        run_start,
                        result,
                    };
                }
                LoopState::Aborted(reason) => {
                    self.notify(|o| o.on_abort(&reason));
                    tracing::warn!(
                        target: "sqlsage.loop",
                        thread_id,
                        steps = state.step_count,
                        reason = %reason,
                        "run aborted"
                    );
                    return LoopOutcome {
                        state,
                        run_start,
                        result: Err(reason),
                    };
                }
            };
        }
    }

    async fn seed(
        &self,
        thread_id: &str,
        user_query: &str,
        system_prompt: &str,
    ) -> std::result::Result<(ConversationState, usize), AbortReason> {
        let loaded = self
            .store
            .load(thread_id)
            .await
            .map_err(|e| AbortReason::CheckpointIo {
                detail: e.to_string(),
            })?;
        let resumed = loaded.is_some();
        let mut state = loaded.unwrap_or_else(|| ConversationState::new(thread_id));

        let repaired = state
            .close_pending(NOT_EXECUTED_NOTICE)
            .map_err(invalid)?;
        if repaired > 0 {
            tracing::info!(
                target: "sqlsage.loop",
                thread_id,
                repaired,
                "closed unanswered requests from a previous run"
            );
        }

        let run_start = state.len();
        if !state.has_system_message() {
            state.push(Message::system(system_prompt)).map_err(invalid)?;
        }
        state.push(Message::user(user_query)).map_err(invalid)?;
        state.user_query = user_query.to_string();
        state.step_count = 0;

        tracing::debug!(target: "sqlsage.loop", thread_id, resumed, "seeded");
        self.checkpoint(&state).await?;
        Ok((state, run_start))
    }

    async fn reason(&self, state: &mut ConversationState) -> LoopState {
        if self.cancelled() {
            return LoopState::Aborted(AbortReason::Cancelled);
        }
        if state.step_count >= self.max_steps {
            return LoopState::Aborted(AbortReason::RecursionLimitExceeded {
                max_steps: self.max_steps,
            });
        }

        let step = state.step_count + 1;
        self.notify(|o| o.on_reasoning(step, self.max_steps));

        let message = match self.reasoning.invoke(state.messages()).await {
            Ok(message) => message,
            Err(e) => {
                return LoopState::Aborted(AbortReason::ModelInvocationFailed {
                    detail: e.to_string(),
                })
            }
        };
        state.step_count = step;

        tracing::debug!(
            target: "sqlsage.loop",
            thread_id = %state.thread_id,
            step,
            actions = message.requested_actions.len(),
            "reasoning step finished"
        );

        if let Err(e) = state.push(message) {
            return LoopState::Aborted(invalid(e));
        }
        if let Err(reason) = self.checkpoint(state).await {
            return LoopState::Aborted(reason);
        }

        if !state.awaiting_actions() {
            return LoopState::Completed;
        }
        if state.step_count >= self.max_steps {
            // The requests stay open; the next run on this thread closes them
            return LoopState::Aborted(AbortReason::RecursionLimitExceeded {
                max_steps: self.max_steps,
            });
        }
        LoopState::Acting
    }

    async fn act(&self, state: &mut ConversationState) -> LoopState {
        for request in state.pending_actions() {
            if self.cancelled() {
                // Answer what is left so the saved history stays well-formed
                if let Err(e) = state.close_pending(CANCELLED_NOTICE) {
                    return LoopState::Aborted(invalid(e));
                }
                return match self.checkpoint(state).await {
                    Ok(()) => LoopState::Aborted(AbortReason::Cancelled),
                    Err(reason) => LoopState::Aborted(reason),
                };
            }

            self.notify(|o| o.on_action(&request));
            let result = self.executor.execute(&request).await;
            self.notify(|o| o.on_action_result(&request, &result));

            if let Err(e) = state.push(result) {
                return LoopState::Aborted(invalid(e));
            }
        }

        match self.checkpoint(state).await {
            Ok(()) => LoopState::Reasoning,
            Err(reason) => LoopState::Aborted(reason),
        }
    }

    async fn checkpoint(&self, state: &ConversationState) -> std::result::Result<(), AbortReason> {
        self.store
            .save(&state.thread_id, state)
            .await
            .map_err(|e| AbortReason::CheckpointIo {
                detail: e.to_string(),
            })
    }
}

fn invalid(e: crate::error::Error) -> AbortReason {
    AbortReason::InvalidRequest {
        detail: e.to_string(),
    }
}
