// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI module for sqlsage
//!
//! Argument parsing plus the rendering shared by the commands.

pub mod args;

pub use args::*;

use serde_json::json;

use crate::agent::{AbortReason, LoopObserver};
use crate::config::Settings;
use crate::llm::message::{ActionRequest, Message, Role, TurnRecord};
use crate::session::{AbortReport, Transcript};

/// Apply per-invocation database options on top of loaded settings
pub fn apply_database_args(settings: &mut Settings, args: &DatabaseArgs) {
    if let Some(ref kind) = args.db_type {
        settings.database.kind = kind.trim().to_lowercase();
    }
    if let Some(ref dsn) = args.db {
        settings.database.dsn = dsn.trim().to_string();
    }
}

/// Cut `text` to at most `max` characters, marking the cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

/// One line per message of a transcript
pub fn format_message(message: &Message) -> String {
    match message.role {
        Role::System => format!("[system] {}", truncate(&message.content, 80)),
        Role::User => format!("[user] {}", message.content),
        Role::Assistant => {
            let mut line = String::from("[assistant]");
            if !message.content.is_empty() {
                line.push(' ');
                line.push_str(&message.content);
            }
            for request in &message.requested_actions {
                line.push_str(&format!("\n  -> {} {}", request.name, request.arguments));
            }
            line
        }
        Role::Tool => {
            let marker = if message.is_error { "error" } else { "ok" };
            format!(
                "[tool {} {}] {}",
                message.responding_to.as_deref().unwrap_or("?"),
                marker,
                truncate(&message.content, 300)
            )
        }
    }
}

/// Plain-text rendering of a finished run
pub fn render_transcript(transcript: &Transcript, show_messages: bool) -> String {
    let mut out = String::new();
    if show_messages {
        for message in transcript.run_messages() {
            out.push_str(&format_message(message));
            out.push('\n');
        }
        out.push('\n');
    }
    if let Some(ref sql) = transcript.last_query_sql {
        out.push_str("SQL:\n");
        out.push_str(sql.trim());
        out.push_str("\n\n");
    }
    out.push_str(&transcript.final_answer);
    out
}

/// JSON rendering of a finished run
pub fn transcript_json(transcript: &Transcript, show_messages: bool) -> serde_json::Value {
    let mut value = json!({
        "thread_id": transcript.thread_id,
        "answer": transcript.final_answer,
        "sql": transcript.last_query_sql,
        "steps": transcript.steps,
    });
    if show_messages {
        value["messages"] = json!(transcript.run_messages());
    }
    value
}

/// JSON rendering of an aborted run
pub fn abort_json(report: &AbortReport) -> serde_json::Value {
    json!({
        "error": report.user_message(),
        "reason": report.reason,
        "sql": report.last_query_sql,
    })
}

/// Plain-text rendering of a thread's history
pub fn render_history(records: &[TurnRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("Q: {}\n", record.query));
        if let Some(ref sql) = record.sql {
            out.push_str(&format!("SQL: {}\n", sql.trim()));
        }
        match record.response {
            Some(ref answer) => out.push_str(&format!("A: {}\n", answer)),
            None => out.push_str("A: (no answer)\n"),
        }
    }
    out
}

/// Prints loop progress to stderr
pub struct ProgressPrinter {
    verbose: bool,
}

impl ProgressPrinter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl LoopObserver for ProgressPrinter {
    fn on_reasoning(&self, step: u32, max_steps: u32) {
        if self.verbose {
            eprintln!("  thinking ({}/{})", step, max_steps);
        }
    }

    fn on_action(&self, request: &ActionRequest) {
        match request.query_text() {
            Some(sql) => eprintln!("  -> {} {}", request.name, truncate(sql.trim(), 100)),
            None => eprintln!("  -> {}", request.name),
        }
    }

    fn on_action_result(&self, request: &ActionRequest, result: &Message) {
        if result.is_error {
            eprintln!("  x {} {}", request.name, truncate(&result.content, 160));
        } else if self.verbose {
            eprintln!("  ok {}", request.name);
        }
    }

    fn on_abort(&self, reason: &AbortReason) {
        if self.verbose {
            eprintln!("  aborted: {}", reason);
        }
    }
}
