// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::database::DatabaseKind;
use crate::error::{Error, Result};

use super::Settings;

impl Settings {
    /// Get the provider API key, checking the env var first.
    pub fn get_api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.provider.api_key.clone())
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(Error::Config(
                "agent.max_steps must be at least 1".to_string(),
            ));
        }
        if self.agent.model_timeout_secs == 0 {
            return Err(Error::Config(
                "agent.model_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(Error::Config(
                "agent.tool_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.resilience.jitter) {
            return Err(Error::Config(
                "resilience.jitter must be between 0.0 and 1.0".to_string(),
            ));
        }
        self.database.kind.parse::<DatabaseKind>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_steps() {
        let mut settings = Settings::default();
        settings.agent.max_steps = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_steps"));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let mut settings = Settings::default();
        settings.agent.model_timeout_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.agent.tool_timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_database_kind() {
        let mut settings = Settings::default();
        settings.database.kind = "oracle".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_validate_accepts_recognized_kinds() {
        let mut settings = Settings::default();
        settings.database.kind = "postgresql".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_get_api_key_from_config() {
        let mut settings = Settings::default();
        settings.provider.api_key_env = "SQLSAGE_TEST_NONEXISTENT_KEY_12345".to_string();
        settings.provider.api_key = Some("sk-config".to_string());
        assert_eq!(settings.get_api_key().as_deref(), Some("sk-config"));
    }

    #[test]
    fn test_get_api_key_none() {
        let mut settings = Settings::default();
        settings.provider.api_key_env = "SQLSAGE_TEST_NONEXISTENT_KEY_12345".to_string();
        settings.provider.api_key = None;
        assert!(settings.get_api_key().is_none());
    }
}
