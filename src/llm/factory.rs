// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory for creating LLM providers

use std::sync::Arc;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::OpenAiProvider;
use crate::llm::retry::{RetryConfig, RetryingProvider};

/// Factory for creating LLM providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create the configured provider, wrapped with retry on transient failures
    pub fn create(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
        let inner = Self::create_openai(settings)?;
        Ok(Arc::new(RetryingProvider::new(
            inner,
            RetryConfig::from(&settings.resilience),
        )))
    }

    /// Create the bare OpenAI-compatible provider
    pub fn create_openai(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
        let api_key = settings.get_api_key().ok_or_else(|| {
            Error::Config(format!(
                "No API key found. Set the {} env var or add provider.api_key to {}.",
                settings.provider.api_key_env,
                Settings::default_path().display()
            ))
        })?;

        let provider = match settings.provider.base_url {
            Some(ref base_url) => OpenAiProvider::with_base_url(api_key, base_url),
            None => OpenAiProvider::new(api_key),
        };

        Ok(Arc::new(provider))
    }

    /// Model used when a run does not name one
    pub fn default_model(settings: &Settings) -> String {
        settings.provider.default_model.clone()
    }

    /// Check if the provider has credentials
    pub fn is_configured(settings: &Settings) -> bool {
        settings.get_api_key().is_some()
    }
}
