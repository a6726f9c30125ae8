// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlsage::checkpoint;
use sqlsage::cli::{
    abort_json, apply_database_args, render_history, render_transcript, transcript_json, AskArgs,
    ChatArgs, DatabaseArgs, HistoryArgs, OutputFormat, ProgressPrinter, SettingsArgs,
    SettingsCommands,
};
use sqlsage::config::Settings;
use sqlsage::error::{Error, Result};
use sqlsage::session::{new_thread_id, CapabilityCache, RunConfig, Session};

/// Raise the returned flag on Ctrl-C so the running turn stops at the next
/// safe point; a second Ctrl-C before the flag is reset quits.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if handle.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            eprintln!("\nStopping after the current step. Press Ctrl-C again to quit.");
        }
    });
    flag
}

fn prepare(settings: &mut Settings, database: &DatabaseArgs) -> Result<()> {
    apply_database_args(settings, database);
    settings.validate()
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(super) async fn run_ask(
    args: AskArgs,
    mut settings: Settings,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    prepare(&mut settings, &args.database)?;

    let cache = CapabilityCache::new();
    let capabilities = cache.capabilities(&settings, args.model.as_deref())?;
    let session = Session::new(checkpoint::open_store(&settings)?);

    let thread_id = args.thread.clone().unwrap_or_else(new_thread_id);
    let mut config = RunConfig::from_settings(&settings, thread_id, capabilities)
        .with_cancel_flag(cancel_on_ctrl_c());
    if let Some(max_steps) = args.max_steps {
        config = config.with_max_steps(max_steps);
    }
    if format == OutputFormat::Text {
        config = config.with_observer(Arc::new(ProgressPrinter::new(verbose)));
    }

    match session.run_turn(&args.question, config).await {
        Ok(transcript) => match format {
            OutputFormat::Json => print_json(&transcript_json(&transcript, args.show_transcript)),
            OutputFormat::Text => {
                println!("{}", render_transcript(&transcript, args.show_transcript));
                Ok(())
            }
        },
        Err(report) => {
            if format == OutputFormat::Json {
                print_json(&abort_json(&report))?;
            }
            Err(Error::InvalidInput(report.user_message()))
        }
    }
}

fn read_question() -> Result<Option<String>> {
    print!("you: ");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

pub(super) async fn run_chat(
    args: ChatArgs,
    mut settings: Settings,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    prepare(&mut settings, &args.database)?;

    let cache = CapabilityCache::new();
    let capabilities = cache.capabilities(&settings, args.model.as_deref())?;
    let session = Session::new(checkpoint::open_store(&settings)?);
    let thread_id = args.thread.clone().unwrap_or_else(new_thread_id);
    let cancel = cancel_on_ctrl_c();

    if format == OutputFormat::Text {
        println!(
            "sqlsage on {} ({}), thread {}. Type 'exit' to quit.",
            settings.database.dsn, capabilities.model, thread_id
        );
    }

    while let Some(question) = read_question()? {
        if question.is_empty() {
            continue;
        }
        if matches!(question.as_str(), "exit" | "quit" | "/exit" | "/quit") {
            break;
        }

        cancel.store(false, Ordering::SeqCst);
        let mut config = RunConfig::from_settings(&settings, &thread_id, capabilities.clone())
            .with_cancel_flag(cancel.clone());
        if let Some(max_steps) = args.max_steps {
            config = config.with_max_steps(max_steps);
        }
        if format == OutputFormat::Text {
            config = config.with_observer(Arc::new(ProgressPrinter::new(verbose)));
        }

        match session.run_turn(&question, config).await {
            Ok(transcript) => match format {
                OutputFormat::Json => print_json(&transcript_json(&transcript, false))?,
                OutputFormat::Text => println!("\n{}\n", render_transcript(&transcript, false)),
            },
            Err(report) => match format {
                OutputFormat::Json => print_json(&abort_json(&report))?,
                OutputFormat::Text => eprintln!("\n{}\n", report.user_message()),
            },
        }
    }

    Ok(())
}

pub(super) async fn run_tables(
    args: DatabaseArgs,
    mut settings: Settings,
    format: OutputFormat,
) -> Result<()> {
    prepare(&mut settings, &args)?;

    let cache = CapabilityCache::new();
    let database = cache.database(&settings.database, settings.agent.read_only)?;
    let tables = database.list_tables().await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "tables": tables })),
        OutputFormat::Text => {
            for table in tables {
                println!("{}", table);
            }
            Ok(())
        }
    }
}

pub(super) async fn run_history(
    args: HistoryArgs,
    settings: Settings,
    format: OutputFormat,
) -> Result<()> {
    let session = Session::new(checkpoint::open_store(&settings)?);

    let Some(thread_id) = args.thread else {
        let threads = session.threads().await?;
        return match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "threads": threads })),
            OutputFormat::Text => {
                if threads.is_empty() {
                    println!("No saved threads.");
                }
                for thread in threads {
                    println!("{}", thread);
                }
                Ok(())
            }
        };
    };

    let records = session.history(&thread_id).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&records)?),
        OutputFormat::Text => {
            print!("{}", render_history(&records));
            Ok(())
        }
    }
}

pub(super) fn run_settings_command(
    args: SettingsArgs,
    settings: Settings,
    config_path: Option<&Path>,
) -> Result<()> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(Settings::default_path);

    match args.command {
        SettingsCommands::Show => {
            let mut shown = settings;
            if shown.provider.api_key.is_some() {
                shown.provider.api_key = Some("********".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        SettingsCommands::Path => {
            println!("{}", path.display());
        }
        SettingsCommands::Init { force } => {
            if path.exists() && !force {
                return Err(Error::Config(format!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                )));
            }
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Settings::default().save_to(&path)?;
            println!("Wrote default settings to {}", path.display());
        }
    }
    Ok(())
}
