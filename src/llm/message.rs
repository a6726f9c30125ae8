// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! Defines the canonical representation of one conversational turn and of a
//! model-issued action request, plus the derived transcript views used for
//! display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ActionKind;

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Text content (may be empty for assistant messages that only request actions)
    #[serde(default)]
    pub content: String,

    /// Logical agent that produced the message (diagnostic only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    /// Actions requested by the model, in issue order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_actions: Vec<ActionRequest>,

    /// For tool messages, the id of the request being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responding_to: Option<String>,

    /// For tool messages, whether the content describes a failure
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,

    /// When the message was created
    pub timestamp: DateTime<Utc>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed workflow instructions
    System,
    /// The person asking questions
    User,
    /// Model output
    Assistant,
    /// Result of an executed action
    Tool,
}

/// A model-issued instruction to invoke one capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Identifier, unique within the conversation
    pub id: String,
    /// Capability name as issued by the model
    pub name: String,
    /// Named arguments (a JSON object)
    #[serde(default = "empty_arguments")]
    pub arguments: serde_json::Value,
}

fn empty_arguments() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ActionRequest {
    /// Create a new action request
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        let arguments = match arguments {
            serde_json::Value::Null => empty_arguments(),
            other => other,
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// SQL text if this is a run-query request carrying a `query` argument
    pub fn query_text(&self) -> Option<&str> {
        match ActionKind::from_name(&self.name) {
            Some(ActionKind::RunQuery) => self.arguments.get("query").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            author_name: None,
            requested_actions: Vec::new(),
            responding_to: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message without requested actions
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message carrying requested actions
    pub fn assistant_with_actions(
        content: impl Into<String>,
        requested_actions: Vec<ActionRequest>,
    ) -> Self {
        let mut message = Self::with_role(Role::Assistant, content.into());
        message.requested_actions = requested_actions;
        message
    }

    /// Create a tool result message answering `responding_to`
    pub fn tool_result(
        responding_to: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut message = Self::with_role(Role::Tool, content.into());
        message.responding_to = Some(responding_to.into());
        message.is_error = is_error;
        message
    }

    /// Set the author label
    pub fn with_author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }

    /// Check if the message carries any requested action
    pub fn has_requested_actions(&self) -> bool {
        !self.requested_actions.is_empty()
    }

    /// An assistant message with no requested actions ends a run
    pub fn is_final_answer(&self) -> bool {
        self.role == Role::Assistant && self.requested_actions.is_empty()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One question/answer exchange rendered for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// The user's question
    pub query: String,
    /// Last SQL the model ran while answering, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Final answer, absent when the turn ended without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Split a message history into one record per user question, in order.
pub fn turn_records(messages: &[Message]) -> Vec<TurnRecord> {
    let mut records: Vec<TurnRecord> = Vec::new();

    for message in messages {
        match message.role {
            Role::User => records.push(TurnRecord {
                query: message.content.clone(),
                sql: None,
                response: None,
            }),
            Role::Assistant => {
                let Some(current) = records.last_mut() else {
                    continue;
                };
                if let Some(sql) = message
                    .requested_actions
                    .iter()
                    .rev()
                    .find_map(ActionRequest::query_text)
                {
                    current.sql = Some(sql.to_string());
                }
                if message.is_final_answer() {
                    current.response = Some(message.content.clone());
                }
            }
            Role::System | Role::Tool => {}
        }
    }

    records
}

/// SQL text of the most recent run-query request in `messages`
pub fn last_query_sql(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .find_map(|m| m.requested_actions.iter().rev().find_map(ActionRequest::query_text))
        .map(str::to_string)
}
