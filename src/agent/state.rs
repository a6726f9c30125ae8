// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation state carried through the loop and persisted per thread

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::llm::message::{ActionRequest, Message, Role};

/// Tool message content used to close requests a previous run never answered
pub const NOT_EXECUTED_NOTICE: &str = "not executed: the previous run ended before this action ran";

/// Mutable state of one conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation identity
    pub thread_id: String,
    /// Full history, append-only
    messages: Vec<Message>,
    /// Question of the current turn
    #[serde(default)]
    pub user_query: String,
    /// Reasoning invocations in the current run
    #[serde(default)]
    pub step_count: u32,
}

impl ConversationState {
    /// Create an empty state for a thread
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            user_query: String::new(),
            step_count: 0,
        }
    }

    /// History in append order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages in the history
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message after checking it keeps the history well-formed.
    ///
    /// Only assistant messages may carry requested actions, and a tool
    /// message must answer a request issued by an earlier assistant message
    /// that has not been answered yet.
    pub fn push(&mut self, message: Message) -> Result<()> {
        if message.role != Role::Assistant && message.has_requested_actions() {
            return Err(Error::InvalidMessage(format!(
                "{} messages cannot carry requested actions",
                message.role
            )));
        }

        if message.role == Role::Assistant {
            let mut issued = self.issued_request_ids();
            for request in &message.requested_actions {
                if !issued.insert(request.id.as_str()) {
                    return Err(Error::InvalidMessage(format!(
                        "request id '{}' is already used in this thread",
                        request.id
                    )));
                }
            }
        }

        if message.role == Role::Tool {
            let Some(ref request_id) = message.responding_to else {
                return Err(Error::InvalidMessage(
                    "tool message does not reference a request".to_string(),
                ));
            };
            if !self.issued_request_ids().contains(request_id.as_str()) {
                return Err(Error::InvalidMessage(format!(
                    "tool message answers unknown request '{}'",
                    request_id
                )));
            }
            if !self.pending_actions().iter().any(|r| &r.id == request_id) {
                return Err(Error::InvalidMessage(format!(
                    "request '{}' has already been answered",
                    request_id
                )));
            }
        }

        self.messages.push(message);
        Ok(())
    }

    fn issued_request_ids(&self) -> HashSet<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.requested_actions.iter().map(|r| r.id.as_str()))
            .collect()
    }

    /// Most recent assistant message
    pub fn latest_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Whether the latest assistant message carries requested actions
    pub fn awaiting_actions(&self) -> bool {
        self.latest_assistant()
            .is_some_and(Message::has_requested_actions)
    }

    /// Requests of the latest assistant message with no tool message yet, in issue order
    pub fn pending_actions(&self) -> Vec<ActionRequest> {
        let Some(position) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };

        let answered: HashSet<&str> = self.messages[position + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.responding_to.as_deref())
            .collect();

        self.messages[position]
            .requested_actions
            .iter()
            .filter(|r| !answered.contains(r.id.as_str()))
            .cloned()
            .collect()
    }

    /// Answer every pending request with an error tool message carrying `notice`.
    ///
    /// Returns the number of messages appended.
    pub fn close_pending(&mut self, notice: &str) -> Result<usize> {
        let pending = self.pending_actions();
        for request in &pending {
            self.push(Message::tool_result(&request.id, notice, true))?;
        }
        Ok(pending.len())
    }

    /// Whether the thread has been seeded with its system message
    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::System)
    }

    /// Serialize for a checkpoint
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore from checkpoint bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Checkpoint(format!("corrupt checkpoint: {}", e)))
    }
}
