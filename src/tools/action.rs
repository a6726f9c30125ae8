// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed actions decoded from model requests

use serde_json::Value;
use thiserror::Error;

use crate::llm::message::ActionRequest;
use crate::llm::provider::{ToolDefinition, ToolInputSchema};

/// The three database capabilities offered to the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ListTables,
    DescribeTable,
    RunQuery,
}

impl ActionKind {
    /// All kinds, in the order they are offered to the model
    pub const ALL: [ActionKind; 3] = [
        ActionKind::ListTables,
        ActionKind::DescribeTable,
        ActionKind::RunQuery,
    ];

    /// Resolve a model-issued name, accepting the legacy tool names
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "list_tables" | "list_tables_tool" => Some(ActionKind::ListTables),
            "describe_table" | "get_table_schema_tool" => Some(ActionKind::DescribeTable),
            "run_query" | "execute_sql_tool" => Some(ActionKind::RunQuery),
            _ => None,
        }
    }

    /// Canonical name sent to the model
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::ListTables => "list_tables",
            ActionKind::DescribeTable => "describe_table",
            ActionKind::RunQuery => "run_query",
        }
    }

    /// Tool definition advertised to the model
    pub fn definition(&self) -> ToolDefinition {
        let (description, input_schema) = match self {
            ActionKind::ListTables => (
                "List all tables in the database.",
                ToolInputSchema::required_strings(&[]),
            ),
            ActionKind::DescribeTable => (
                "Get the columns of one table: name, declared type, nullability, primary key position and foreign key target.",
                ToolInputSchema::required_strings(&[(
                    "table_name",
                    "Exact name of the table to describe",
                )]),
            ),
            ActionKind::RunQuery => (
                "Execute one SQL query and return its columns and rows. Only read-only queries are allowed.",
                ToolInputSchema::required_strings(&[(
                    "query",
                    "The SQL statement to run, verbatim",
                )]),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Tool definitions for every capability
pub fn definitions() -> Vec<ToolDefinition> {
    ActionKind::ALL.iter().map(ActionKind::definition).collect()
}

/// A validated action ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ListTables,
    DescribeTable { table_name: String },
    RunQuery { query: String },
}

/// Why a request could not be turned into an [`Action`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown action '{0}'; available actions are list_tables, describe_table, run_query")]
    UnknownAction(String),

    #[error("arguments for {action} must be a JSON object")]
    ArgumentsNotObject { action: &'static str },

    #[error("{action} requires the '{argument}' argument")]
    MissingArgument {
        action: &'static str,
        argument: &'static str,
    },

    #[error("'{argument}' for {action} must be a non-empty string")]
    InvalidArgument {
        action: &'static str,
        argument: &'static str,
    },
}

impl Action {
    /// Decode a model request into a typed action
    pub fn decode(request: &ActionRequest) -> Result<Self, ValidationError> {
        let kind = ActionKind::from_name(&request.name)
            .ok_or_else(|| ValidationError::UnknownAction(request.name.clone()))?;

        let args = match &request.arguments {
            Value::Object(map) => map,
            _ => {
                return Err(ValidationError::ArgumentsNotObject {
                    action: kind.name(),
                })
            }
        };

        let text_arg = |argument: &'static str| -> Result<String, ValidationError> {
            match args.get(argument) {
                None | Some(Value::Null) => Err(ValidationError::MissingArgument {
                    action: kind.name(),
                    argument,
                }),
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
                Some(_) => Err(ValidationError::InvalidArgument {
                    action: kind.name(),
                    argument,
                }),
            }
        };

        Ok(match kind {
            ActionKind::ListTables => Action::ListTables,
            ActionKind::DescribeTable => Action::DescribeTable {
                table_name: text_arg("table_name")?.trim().to_string(),
            },
            ActionKind::RunQuery => Action::RunQuery {
                query: text_arg("query")?,
            },
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ListTables => ActionKind::ListTables,
            Action::DescribeTable { .. } => ActionKind::DescribeTable,
            Action::RunQuery { .. } => ActionKind::RunQuery,
        }
    }
}
