// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! One model invocation turned into one assistant message

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{ApiError, Error, Result};
use crate::llm::message::{ActionRequest, Message};
use crate::llm::provider::{
    CompletionRequest, ContentBlockResponse, LlmProvider, ToolChoice, ToolDefinition,
};
use crate::tools;

/// Author label stamped on assistant messages
pub const AGENT_NAME: &str = "sql_agent";

/// Stateless wrapper around the bound model capability
pub struct ReasoningStep {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    tools: Vec<ToolDefinition>,
}

impl ReasoningStep {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
            tools: tools::definitions(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the model for its next step given the full history
    pub async fn invoke(&self, messages: &[Message]) -> Result<Message> {
        let request = CompletionRequest::new(&self.model, messages.to_vec())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_tools(self.tools.clone())
            .with_tool_choice(ToolChoice::Auto);

        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| Error::Api(ApiError::Timeout))??;

        tracing::debug!(
            target: "sqlsage.reasoning",
            provider = self.provider.name(),
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            duration_ms = started.elapsed().as_millis() as u64,
            "model responded"
        );

        // Request ids must be unique across the whole thread
        let mut taken: HashSet<String> = messages
            .iter()
            .flat_map(|m| m.requested_actions.iter().map(|r| r.id.clone()))
            .collect();

        let mut text = String::new();
        let mut requests: Vec<ActionRequest> = Vec::new();
        for block in response.content {
            match block {
                ContentBlockResponse::Text { text: t } => text.push_str(&t),
                ContentBlockResponse::ToolUse { id, name, input } => {
                    let id = if id.trim().is_empty() || taken.contains(&id) {
                        tracing::debug!(
                            target: "sqlsage.reasoning",
                            id = %id,
                            "replacing unusable request id"
                        );
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        id
                    };
                    taken.insert(id.clone());
                    requests.push(ActionRequest::new(id, name, input))
                }
            }
        }

        Ok(Message::assistant_with_actions(text, requests).with_author(AGENT_NAME))
    }
}
