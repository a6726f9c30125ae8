// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The text-to-SQL agent
//!
//! A reasoning step asks the model what to do next, the action executor
//! carries out the requested database actions, and the orchestrator
//! alternates the two until the model answers or the run is stopped.

pub mod orchestrator;
pub mod prompt;
pub mod reasoning;
pub mod state;

pub use orchestrator::{AbortReason, LoopObserver, LoopOutcome, LoopState, Orchestrator};
pub use prompt::build_system_prompt;
pub use reasoning::{ReasoningStep, AGENT_NAME};
pub use state::ConversationState;
