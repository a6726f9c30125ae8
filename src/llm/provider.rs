// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The model capability
//!
//! The agent only ever asks for one non-streaming completion over the full
//! message history. Anything vendor-specific stays behind [`LlmProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::message::Message;

/// A chat model that can request actions
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short identifier used in logs and cache keys
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;
}

/// Everything the model sees for one reasoning step
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// Full thread, system message first
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Actions the model may request
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: 4096,
            temperature: 0.0,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }
}

/// Whether the model may, must, or must not request actions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

/// A model reply, already normalized from the vendor format
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    /// Text and action requests in the order the model produced them
    pub content: Vec<ContentBlockResponse>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl CompletionResponse {
    /// All text blocks joined
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlockResponse::Text { text } => Some(text.as_str()),
                ContentBlockResponse::ToolUse { .. } => None,
            })
            .collect()
    }

    /// Whether any block requests an action
    pub fn requests_actions(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlockResponse::ToolUse { .. }))
    }
}

/// One block of a model reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockResponse {
    Text {
        text: String,
    },
    /// A requested action; `input` is the decoded argument object
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
}

/// Token accounting reported by the vendor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// An action advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema of an action's argument object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Always "object"
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    /// Object whose properties are all required strings
    pub fn required_strings(fields: &[(&str, &str)]) -> Self {
        let properties: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(name, description)| {
                (
                    name.to_string(),
                    serde_json::json!({"type": "string", "description": description}),
                )
            })
            .collect();
        Self {
            schema_type: "object".to_string(),
            properties: serde_json::Value::Object(properties),
            required: fields.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }
}
