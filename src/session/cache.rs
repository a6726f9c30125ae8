// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Reuse of constructed capabilities across runs
//!
//! Providers are keyed by endpoint, model and a fingerprint of the API key
//! so the key itself is never kept as a map key. Databases are keyed by
//! kind, DSN and read-only policy.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Capabilities;
use crate::config::{DatabaseConfig, Settings};
use crate::database::{Database, DatabaseFactory};
use crate::error::Result;
use crate::llm::factory::ProviderFactory;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai::OPENAI_API_URL;
use crate::tools::ReadOnlyPolicy;

/// Cache of constructed providers and databases
#[derive(Default)]
pub struct CapabilityCache {
    providers: Mutex<HashMap<String, Arc<dyn LlmProvider>>>,
    databases: Mutex<HashMap<String, Arc<dyn Database>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Short, stable, non-reversible tag for a secret
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for the provider described by `settings` and `model`
    pub fn provider_key(settings: &Settings, model: &str) -> String {
        let base_url = settings
            .provider
            .base_url
            .as_deref()
            .unwrap_or(OPENAI_API_URL);
        let key = settings
            .get_api_key()
            .map(|k| fingerprint(&k))
            .unwrap_or_else(|| "none".to_string());
        format!("openai|{}|{}|{}", base_url, model, key)
    }

    /// Cache key for a database
    pub fn database_key(config: &DatabaseConfig, policy: ReadOnlyPolicy) -> String {
        format!(
            "{}|{}|{:?}",
            config.kind.trim().to_lowercase(),
            config.dsn.trim(),
            policy
        )
    }

    /// Provider for `model`, built on first use
    pub fn provider(&self, settings: &Settings, model: &str) -> Result<Arc<dyn LlmProvider>> {
        let key = Self::provider_key(settings, model);
        if let Some(provider) = lock(&self.providers).get(&key) {
            return Ok(provider.clone());
        }

        let provider = ProviderFactory::create(settings)?;
        tracing::debug!(target: "sqlsage.session", model, "provider constructed");
        lock(&self.providers).insert(key, provider.clone());
        Ok(provider)
    }

    /// Database for `config`, opened on first use
    pub fn database(
        &self,
        config: &DatabaseConfig,
        policy: ReadOnlyPolicy,
    ) -> Result<Arc<dyn Database>> {
        let key = Self::database_key(config, policy);
        if let Some(database) = lock(&self.databases).get(&key) {
            return Ok(database.clone());
        }

        let database = DatabaseFactory::open(config, policy)?;
        tracing::debug!(target: "sqlsage.session", kind = %config.kind, "database opened");
        lock(&self.databases).insert(key, database.clone());
        Ok(database)
    }

    /// Provider and database for a run, `model` overriding the configured default
    pub fn capabilities(&self, settings: &Settings, model: Option<&str>) -> Result<Capabilities> {
        let model = model
            .map(str::to_string)
            .unwrap_or_else(|| ProviderFactory::default_model(settings));
        let provider = self.provider(settings, &model)?;
        let database = self.database(&settings.database, settings.agent.read_only)?;
        Ok(Capabilities::new(provider, model, database))
    }

    /// Number of cached providers and databases
    pub fn cached_counts(&self) -> (usize, usize) {
        (lock(&self.providers).len(), lock(&self.databases).len())
    }
}
