// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for sqlsage.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// sqlsage - ask questions of a relational database in plain language
#[derive(Parser, Debug)]
#[command(name = "sqlsage")]
#[command(version, about = "Ask questions of a relational database in plain language")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to ~/.sqlsage/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question
    Ask(AskArgs),

    /// Interactive session that keeps one conversation thread
    Chat(ChatArgs),

    /// List the tables of the configured database
    Tables(DatabaseArgs),

    /// Show the questions and answers of a thread
    History(HistoryArgs),

    /// Manage configuration
    #[command(alias = "config")]
    Settings(SettingsArgs),
}

/// Options that pick the database for one invocation
#[derive(clap::Args, Debug, Default, Clone)]
pub struct DatabaseArgs {
    /// Database connection string (overrides settings and DB_DSN)
    #[arg(long)]
    pub db: Option<String>,

    /// Database kind (sqlite, postgresql, mysql)
    #[arg(long = "db-type")]
    pub db_type: Option<String>,
}

/// Arguments for the ask subcommand
#[derive(clap::Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    pub question: String,

    /// Conversation thread to continue
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Maximum reasoning steps
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print every message of the run, not just the answer
    #[arg(long)]
    pub show_transcript: bool,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Conversation thread to use (a fresh one if omitted)
    #[arg(short, long)]
    pub thread: Option<String>,

    /// Maximum reasoning steps per question
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

/// Arguments for the history subcommand
#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    /// Thread to show (lists saved threads if omitted)
    pub thread: Option<String>,
}

/// Arguments for settings management
#[derive(clap::Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

/// Settings subcommands
#[derive(Subcommand, Debug, PartialEq)]
pub enum SettingsCommands {
    /// Show current configuration
    Show,

    /// Print the settings file path
    Path,

    /// Write a settings file with default values
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for responses
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Text,

    /// JSON output
    Json,
}
