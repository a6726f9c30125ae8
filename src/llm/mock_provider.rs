// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Plays back a scripted sequence of model turns (text, action requests or
//! failures) and records every request it receives, so agent-loop behaviour
//! can be asserted without network access.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockResponse, LlmProvider, StopReason, Usage,
};

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Scripted responses, consumed in order
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Artificial latency applied before answering
    delay: Option<Duration>,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to return
    pub text: String,
    /// Tool calls to return, in order
    pub tool_calls: Vec<MockToolCall>,
    /// Stop reason
    pub stop_reason: StopReason,
    /// Token usage
    pub usage: Usage,
    /// When set, the call fails with a server error carrying this message
    pub failure: Option<String>,
}

/// A mock tool call
#[derive(Clone, Debug)]
pub struct MockToolCall {
    /// Tool call ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input (JSON)
    pub input: serde_json::Value,
}

impl MockToolCall {
    /// Create a tool call with an explicit id
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

impl MockResponse {
    /// A final text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A turn requesting the given actions
    pub fn tool_calls(calls: Vec<MockToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        }
    }

    /// A single action request
    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        Self::tool_calls(vec![MockToolCall::new(id, name, input)])
    }

    /// A failed provider call
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 10,
                output_tokens: 20,
            },
            failure: None,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider answering "Mock response"
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
            delay: None,
        }
    }

    /// Create a mock provider with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut provider = Self::new();
        provider.name = name.into();
        provider
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Queue responses; once exhausted the last one repeats
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        {
            let mut responses = lock(&self.responses);
            responses.clear();
            responses.extend(script);
        }
        self
    }

    /// Wait this long before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        lock(&self.recorded_requests).clear();
    }

    fn next_response(&self) -> MockResponse {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = lock(&self.responses);
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses[count.min(responses.len() - 1)].clone()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        lock(&self.recorded_requests).push(request.clone());
        let response = self.next_response();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = response.failure {
            return Err(ApiError::ServerError {
                status: 500,
                message,
            }
            .into());
        }

        let mut content = vec![];
        if !response.text.is_empty() {
            content.push(ContentBlockResponse::Text {
                text: response.text,
            });
        }
        for tool_call in response.tool_calls {
            content.push(ContentBlockResponse::ToolUse {
                id: tool_call.id,
                name: tool_call.name,
                input: tool_call.input,
            });
        }

        Ok(CompletionResponse {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            model: request.model,
            content,
            stop_reason: Some(response.stop_reason),
            usage: response.usage,
        })
    }
}
