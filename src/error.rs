// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for sqlsage
//!
//! This module defines all error types used throughout the application.

use std::time::Duration;
use thiserror::Error;

/// Main error type for sqlsage operations
#[derive(Error, Debug)]
pub enum Error {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Database capability errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A message violates the conversation invariants
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Context window exceeded
    #[error("Context too long: {current} tokens exceeds limit of {limit}")]
    ContextTooLong { current: u32, limit: u32 },

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,
}

/// Failures reported by a bound database capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The referenced table does not exist
    #[error("Table not found: {0}")]
    NotFound(String),

    /// The backend rejected or failed to run a statement
    #[error("Execution error: {0}")]
    Execution(String),

    /// The statement is not allowed under the read-only policy
    #[error("Statement rejected: {0}")]
    Rejected(String),

    /// The call did not finish within the configured timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The database kind is not supported by this build
    #[error("Unsupported database: {0}")]
    Unsupported(String),
}

impl DatabaseError {
    /// Short machine-readable kind, used in tool error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            DatabaseError::NotFound(_) => "NotFound",
            DatabaseError::Execution(_) => "ExecutionError",
            DatabaseError::Rejected(_) => "Rejected",
            DatabaseError::Timeout(_) => "Timeout",
            DatabaseError::Unsupported(_) => "Unsupported",
        }
    }
}

/// Result type alias for sqlsage operations
pub type Result<T> = std::result::Result<T, Error>;
