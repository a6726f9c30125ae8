// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::Settings;

/// Environment variable overriding the database kind
pub const DB_TYPE_ENV: &str = "DB_TYPE";
/// Environment variable overriding the database connection string
pub const DB_DSN_ENV: &str = "DB_DSN";

impl Settings {
    /// Get the default settings file path.
    pub fn default_path() -> PathBuf {
        Self::sqlsage_home().join("settings.json")
    }

    /// Load settings from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::default_path())?;
        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save settings to a specific path, merging with existing file content
    /// to preserve keys this version does not know about.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let new_value = serde_json::to_value(self)?;
        let merged = if path.exists() {
            let existing_content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<Value>(&existing_content) {
                Ok(existing_value) => deep_merge(existing_value, new_value),
                Err(_) => new_value,
            }
        } else {
            new_value
        };

        let content = serde_json::to_string_pretty(&merged)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `DB_TYPE` / `DB_DSN` overrides using the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup(DB_TYPE_ENV).filter(|v| !v.trim().is_empty()) {
            self.database.kind = kind.trim().to_lowercase();
        }
        if let Some(dsn) = lookup(DB_DSN_ENV).filter(|v| !v.trim().is_empty()) {
            self.database.dsn = dsn.trim().to_string();
        }
    }

    /// Get the sqlsage home directory (~/.sqlsage or $SQLSAGE_HOME).
    pub fn sqlsage_home() -> PathBuf {
        if let Ok(home) = std::env::var("SQLSAGE_HOME") {
            return PathBuf::from(home);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sqlsage")
    }

    /// File used by the sqlite checkpoint backend.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint
            .path
            .clone()
            .unwrap_or_else(|| Self::sqlsage_home().join("checkpoints.db"))
    }
}

/// Deep-merge two JSON values; `overlay` wins on conflicts.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_base, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_env_overrides_apply() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|key| match key {
            DB_TYPE_ENV => Some("SQLite".to_string()),
            DB_DSN_ENV => Some("sqlite:///tmp/other.db".to_string()),
            _ => None,
        });

        assert_eq!(settings.database.kind, "sqlite");
        assert_eq!(settings.database.dsn, "sqlite:///tmp/other.db");
    }

    #[test]
    fn test_env_overrides_ignore_blank_values() {
        let mut settings = Settings::default();
        let before = settings.database.dsn.clone();
        settings.apply_env_overrides(|_| Some("  ".to_string()));

        assert_eq!(settings.database.kind, "sqlite");
        assert_eq!(settings.database.dsn, before);
    }

    #[test]
    fn test_checkpoint_path_prefers_configured() {
        let mut settings = Settings::default();
        assert!(settings.checkpoint_path().ends_with("checkpoints.db"));

        settings.checkpoint.path = Some(PathBuf::from("/var/lib/sqlsage/cp.db"));
        assert_eq!(
            settings.checkpoint_path(),
            PathBuf::from("/var/lib/sqlsage/cp.db")
        );
    }

    #[test]
    fn test_deep_merge_overlay_wins() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let overlay = json!({"nested": {"y": 3}, "b": true});

        let merged = deep_merge(base, overlay);
        assert_eq!(merged, json!({"a": 1, "b": true, "nested": {"x": 1, "y": 3}}));
    }
}
