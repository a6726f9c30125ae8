// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! sqlsage - a resumable text-to-SQL agent.
//!
//! A language model is asked what to do next, the database actions it
//! requests are run, and the results are fed back until the model answers
//! in plain language. Conversations are checkpointed per thread after every
//! step so they can be resumed.
//!
//! Architecture highlights:
//! - `session`: entry point; seeds or resumes a thread and returns a transcript
//! - `agent`: the orchestration state machine and the reasoning step
//! - `tools`: typed database actions, the read-only guard and the executor
//! - `database`: the database capability and its SQLite adapter
//! - `llm`: provider abstraction, the OpenAI-compatible client and retries
//! - `checkpoint`: in-memory and SQLite conversation stores
//! - `config`, `cli`: settings and the command-line surface

pub mod agent;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod session;
pub mod tools;

pub use error::{Error, Result};
