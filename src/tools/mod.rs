// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Action system for sqlsage
//!
//! Decodes the actions a model requests, runs them against the bound
//! database and turns every outcome, failures included, into a tool message
//! the model can read.

pub mod action;
pub mod executor;
pub mod policy;

pub use action::*;
pub use executor::*;
pub use policy::*;

use std::sync::Arc;
use std::time::Duration;

use crate::database::Database;
use crate::llm::message::Message;

/// Default rows included in a query result before truncation
pub const DEFAULT_MAX_RESULT_ROWS: usize = 200;

/// Default timeout for one database call
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Context provided to actions during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Database the actions run against
    pub database: Arc<dyn Database>,
    /// Upper bound for one database call
    pub tool_timeout: Duration,
    /// Whether non-read statements are refused before reaching the database
    pub read_only: ReadOnlyPolicy,
    /// Rows included in a query result before truncation
    pub max_result_rows: usize,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("database", &self.database.kind())
            .field("tool_timeout", &self.tool_timeout)
            .field("read_only", &self.read_only)
            .field("max_result_rows", &self.max_result_rows)
            .finish()
    }
}

impl ToolContext {
    /// Create a new tool context with default limits
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            read_only: ReadOnlyPolicy::default(),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }

    /// Set the per-call timeout
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the read-only policy
    pub fn with_read_only(mut self, policy: ReadOnlyPolicy) -> Self {
        self.read_only = policy;
        self
    }

    /// Set the result row cap
    pub fn with_max_result_rows(mut self, rows: usize) -> Self {
        self.max_result_rows = rows;
        self
    }
}

/// Result of executing one action
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The request id this result answers
    pub tool_use_id: String,
    /// The output of the action
    pub output: ToolOutput,
}

/// Output from an action
#[derive(Debug, Clone)]
pub enum ToolOutput {
    /// Successful output
    Success(String),
    /// Error output
    Error(String),
}

impl ToolResult {
    /// Create a successful result
    pub fn success(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Success(output.into()),
        }
    }

    /// Create an error result
    pub fn error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: ToolOutput::Error(error.into()),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// Get the output text
    pub fn output_text(&self) -> &str {
        match &self.output {
            ToolOutput::Success(s) => s,
            ToolOutput::Error(s) => s,
        }
    }

    /// Convert into the tool message appended to the conversation
    pub fn into_message(self) -> Message {
        let is_error = self.is_error();
        let content = match self.output {
            ToolOutput::Success(s) | ToolOutput::Error(s) => s,
        };
        Message::tool_result(self.tool_use_id, content, is_error)
    }
}
