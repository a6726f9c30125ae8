// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! sqlsage - ask questions of a relational database in plain language
//!
//! Entry point for the sqlsage CLI application.

use clap::Parser;

use sqlsage::cli::{Cli, Commands};
use sqlsage::config::Settings;
use sqlsage::error::Result;

#[path = "main/cli_commands.rs"]
mod cli_commands;

use cli_commands::{run_ask, run_chat, run_history, run_settings_command, run_tables};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // .env may supply OPENAI_API_KEY, DB_TYPE and DB_DSN
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the loop targets; RUST_LOG still takes precedence.
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "debug" } else { "info" };
        for target in [
            "sqlsage.loop",
            "sqlsage.reasoning",
            "sqlsage.tools",
            "sqlsage.database",
            "sqlsage.session",
            "sqlsage.llm",
            "sqlsage.retry",
        ] {
            if let Ok(parsed) = format!("{}={}", target, level).parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match cli.config {
        Some(ref path) => {
            let mut settings = Settings::load_from(path)?;
            settings.apply_env_overrides(|key| std::env::var(key).ok());
            settings
        }
        None => Settings::load()?,
    };

    let verbose = cli.verbose > 0;
    match cli.command {
        None => run_chat(Default::default(), settings, cli.format, verbose).await,
        Some(Commands::Ask(args)) => run_ask(args, settings, cli.format, verbose).await,
        Some(Commands::Chat(args)) => run_chat(args, settings, cli.format, verbose).await,
        Some(Commands::Tables(args)) => run_tables(args, settings, cli.format).await,
        Some(Commands::History(args)) => run_history(args, settings, cli.format).await,
        Some(Commands::Settings(args)) => {
            run_settings_command(args, settings, cli.config.as_deref())
        }
    }
}
