// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Speaks the `/chat/completions` wire format with function tools. Works
//! against OpenAI itself and any compatible gateway reachable through a
//! custom base URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Error, Result};
use crate::llm::message::{Message, Role};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, ContentBlockResponse, LlmProvider, StopReason,
    ToolChoice, ToolDefinition, Usage,
};
use crate::llm::providers::common::{
    parse_numeric_token_counts, parse_retry_after_seconds, server_error, DEFAULT_RETRY_AFTER_SECS,
};

/// Default endpoint for chat completions
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new provider against the public OpenAI endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create with a custom endpoint URL
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    /// Endpoint this provider posts to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert conversation messages to the chat completions format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => OpenAiMessage::text("system", &m.content),
                Role::User => OpenAiMessage::text("user", &m.content),
                Role::Assistant => {
                    let tool_calls: Vec<OpenAiToolCall> = m
                        .requested_actions
                        .iter()
                        .map(|action| OpenAiToolCall {
                            id: action.id.clone(),
                            r#type: "function".to_string(),
                            function: OpenAiFunctionCall {
                                name: action.name.clone(),
                                arguments: action.arguments.to_string(),
                            },
                        })
                        .collect();

                    OpenAiMessage {
                        role: "assistant".to_string(),
                        content: if m.content.is_empty() && !tool_calls.is_empty() {
                            None
                        } else {
                            Some(m.content.clone())
                        },
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        tool_call_id: None,
                    }
                }
                Role::Tool => {
                    let content = if m.is_error {
                        format!("Error: {}", m.content)
                    } else {
                        m.content.clone()
                    };
                    OpenAiMessage {
                        role: "tool".to_string(),
                        content: Some(content),
                        tool_calls: None,
                        tool_call_id: m.responding_to.clone(),
                    }
                }
            })
            .collect()
    }

    /// Convert tools to the function-tool format
    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
        tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function".to_string(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: serde_json::json!({
                        "type": t.input_schema.schema_type,
                        "properties": t.input_schema.properties,
                        "required": t.input_schema.required,
                    }),
                },
            })
            .collect()
    }

    /// Build the request body
    fn build_request(&self, request: &CompletionRequest) -> OpenAiRequest {
        let tool_choice = match &request.tool_choice {
            ToolChoice::Auto => OpenAiToolChoice::Auto,
            ToolChoice::None => OpenAiToolChoice::None,
            ToolChoice::Required => OpenAiToolChoice::Required,
        };

        let has_tools = !request.tools.is_empty();
        OpenAiRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            tools: has_tools.then(|| self.convert_tools(&request.tools)),
            tool_choice: has_tools.then_some(tool_choice),
        }
    }

    /// Parse an error response
    fn parse_error(&self, status: u16, retry_after: Option<u32>, body: &str) -> Error {
        let Ok(error_response) = serde_json::from_str::<OpenAiError>(body) else {
            return match status {
                401 | 403 => Error::Api(ApiError::AuthenticationFailed),
                429 => Error::Api(ApiError::RateLimited(
                    retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                )),
                _ => server_error(status, body),
            };
        };

        let message = error_response.error.message;
        let code = error_response.error.code.as_deref().unwrap_or("");

        match (status, code) {
            (_, "invalid_api_key") | (401, _) => Error::Api(ApiError::AuthenticationFailed),
            (_, "rate_limit_exceeded") | (429, _) => Error::Api(ApiError::RateLimited(
                retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            )),
            (_, "context_length_exceeded") => {
                let (current, limit) = parse_numeric_token_counts(&message);
                Error::Api(ApiError::ContextTooLong { current, limit })
            }
            (_, "model_not_found") | (404, _) => Error::Api(ApiError::ModelNotFound(message)),
            _ => server_error(status, message),
        }
    }

    fn parse_response(&self, api_response: OpenAiResponse) -> Result<CompletionResponse> {
        let choice = api_response.choices.into_iter().next().ok_or_else(|| {
            Error::Api(ApiError::InvalidResponse(
                "No choices in response".to_string(),
            ))
        })?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlockResponse::Text { text });
            }
        }

        for tc in choice.message.tool_calls.unwrap_or_default() {
            // Unparseable arguments are passed through as a string so the
            // executor can report them back to the model.
            let input = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments));
            content.push(ContentBlockResponse::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input,
            });
        }

        let stop_reason = choice.finish_reason.as_deref().map(|r| match r {
            "length" => StopReason::MaxTokens,
            "tool_calls" | "function_call" => StopReason::ToolUse,
            "stop" => StopReason::EndTurn,
            _ => StopReason::EndTurn,
        });

        let usage = api_response.usage.unwrap_or_default();
        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content,
            stop_reason,
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request);

        tracing::debug!(
            target: "sqlsage.llm",
            model = %request.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Api(ApiError::Timeout)
                } else if e.is_connect() {
                    Error::Api(ApiError::Network(e.to_string()))
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = parse_retry_after_seconds(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status, retry_after, &body));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Error::Api(ApiError::InvalidResponse(e.to_string())))?;

        self.parse_response(api_response)
    }
}

// Chat completions wire types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<OpenAiToolChoice>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    r#type: String,
    function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    r#type: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum OpenAiToolChoice {
    Auto,
    None,
    Required,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}
