// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for sqlsage
//!
//! Handles loading and saving settings from ~/.sqlsage/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tools::ReadOnlyPolicy;

mod io;
mod validation;

/// Main settings structure, stored in ~/.sqlsage/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Language model provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Agent loop limits and policies
    #[serde(default)]
    pub agent: AgentConfig,

    /// Retry and resilience settings for API calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Conversation checkpoint storage
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat completions endpoint (for compatible gateways)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default model to use
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens for each model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database kind: "sqlite", "postgresql" or "mysql"
    #[serde(default = "default_database_kind")]
    pub kind: String,

    /// Connection string
    #[serde(default = "default_dsn")]
    pub dsn: String,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reasoning steps per question
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Timeout for one model call, in seconds
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Timeout for one database call, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Rows included in a query result before truncation
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// Whether non-read statements are refused before reaching the database
    #[serde(default)]
    pub read_only: ReadOnlyPolicy,
}

/// Retry and resilience configuration for API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// Where conversation checkpoints live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    /// Process lifetime only
    #[default]
    Memory,
    /// SQLite file, survives restarts
    Sqlite,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: CheckpointBackend,

    /// File used by the sqlite backend (defaults to ~/.sqlsage/checkpoints.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: None,
            default_model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_database_kind(),
            dsn: default_dsn(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            model_timeout_secs: default_model_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_result_rows: default_max_result_rows(),
            read_only: ReadOnlyPolicy::default(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_database_kind() -> String {
    "sqlite".to_string()
}

fn default_dsn() -> String {
    "sqlite:///data/sakila_master.db".to_string()
}

fn default_max_steps() -> u32 {
    25
}

fn default_model_timeout_secs() -> u64 {
    120
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_result_rows() -> usize {
    200
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    16000
}

fn default_jitter() -> f64 {
    0.25
}
