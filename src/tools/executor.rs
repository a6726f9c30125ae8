// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Action execution engine
//!
//! Runs one request at a time against the bound database. Nothing here
//! raises past the executor: unknown actions, bad arguments, refused
//! statements, database failures and timeouts all come back as error tool
//! results so the model can correct itself.

use serde_json::{json, Value};
use std::time::Instant;

use crate::database::{ColumnInfo, DbResult, QueryResult};
use crate::error::DatabaseError;
use crate::llm::message::{ActionRequest, Message};

use super::{check_read_only, Action, ToolContext, ToolResult};

/// Executes decoded actions against the database in the tool context
pub struct ActionExecutor {
    context: ToolContext,
}

impl ActionExecutor {
    /// Create a new executor
    pub fn new(context: ToolContext) -> Self {
        Self { context }
    }

    /// The context actions run in
    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Execute one request and return its tool message
    pub async fn execute(&self, request: &ActionRequest) -> Message {
        self.execute_request(request).await.into_message()
    }

    /// Execute one request and return the raw result
    pub async fn execute_request(&self, request: &ActionRequest) -> ToolResult {
        let started = Instant::now();

        let result = match Action::decode(request) {
            Ok(action) => self.run(&request.id, action).await,
            Err(e) => ToolResult::error(&request.id, error_payload("ValidationError", &e.to_string())),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if result.is_error() {
            tracing::info!(
                target: "sqlsage.tools",
                action = %request.name,
                request_id = %request.id,
                duration_ms,
                error = %result.output_text(),
                "action failed"
            );
        } else {
            tracing::debug!(
                target: "sqlsage.tools",
                action = %request.name,
                request_id = %request.id,
                duration_ms,
                "action succeeded"
            );
        }

        result
    }

    async fn run(&self, request_id: &str, action: Action) -> ToolResult {
        let outcome = match action {
            Action::ListTables => self
                .bounded(self.context.database.list_tables())
                .await
                .map(|tables| json!({ "tables": tables })),
            Action::DescribeTable { table_name } => self
                .bounded(self.context.database.describe_table(&table_name))
                .await
                .map(|columns| describe_payload(&table_name, &columns)),
            Action::RunQuery { query } => {
                if self.context.read_only.is_enforced() {
                    if let Err(reason) = check_read_only(&query) {
                        return ToolResult::error(
                            request_id,
                            error_payload(DatabaseError::Rejected(String::new()).kind(), &reason),
                        );
                    }
                }
                self.bounded(self.context.database.run_query(&query))
                    .await
                    .map(|result| query_payload(&result, self.context.max_result_rows))
            }
        };

        match outcome {
            Ok(value) => ToolResult::success(request_id, value.to_string()),
            Err(e) => ToolResult::error(request_id, error_payload(e.kind(), &e.to_string())),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> DbResult<T>
    where
        F: std::future::Future<Output = DbResult<T>>,
    {
        match tokio::time::timeout(self.context.tool_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout(self.context.tool_timeout)),
        }
    }
}

/// Structured error description carried in tool message content
fn error_payload(kind: &str, message: &str) -> String {
    json!({ "error": { "kind": kind, "message": message } }).to_string()
}

fn describe_payload(table_name: &str, columns: &[ColumnInfo]) -> Value {
    json!({ "table": table_name, "columns": columns })
}

fn query_payload(result: &QueryResult, max_rows: usize) -> Value {
    let rows: Vec<Value> = result
        .rows
        .iter()
        .take(max_rows)
        .map(|row| Value::Array(row.iter().map(|cell| cell.to_json()).collect()))
        .collect();

    json!({
        "columns": result.columns,
        "rows": rows,
        "row_count": result.row_count(),
        "truncated": result.row_count() > max_rows,
    })
}
