//! Logs command - view and manage application logs

use std::path::PathBuf;

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::get_dir;
use crate::output;
use tasklist_core::services::{EntryPoint, LoggingService};

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent log entries
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old log entries
    Clear {
        /// Delete logs older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Copy the log database to a file for troubleshooting
    Export {
        /// Destination path
        output: PathBuf,
    },
    /// Show log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn get_logging_service() -> Result<LoggingService> {
    let dir = get_dir();
    std::fs::create_dir_all(&dir)?;
    LoggingService::new(&dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
}

fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::{Local, TimeZone};
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn list(limit: usize, errors_only: bool, json: bool) -> Result<()> {
    let service = get_logging_service()?;
    let entries = if errors_only {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", "No log entries yet.".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Via", "Event", "Backend", "Where", "Error"]);
    for entry in &entries {
        let place = entry
            .route
            .as_deref()
            .or(entry.command.as_deref())
            .unwrap_or_default();
        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.entry_point.clone(),
            entry.event.clone(),
            entry.backend.clone().unwrap_or_default(),
            place.to_string(),
            entry.error_message.clone().unwrap_or_default(),
        ]);
    }
    println!("{}", table);

    if !errors_only {
        let failures = entries.iter().filter(|e| e.error_message.is_some()).count();
        if failures > 0 {
            println!(
                "{}",
                format!("{failures} failure(s) shown; 'tasks logs list --errors' for details").red()
            );
        }
    }
    Ok(())
}

fn clear(older_than_days: u64, force: bool, json: bool) -> Result<()> {
    let service = get_logging_service()?;
    let cutoff = chrono::Utc::now() - chrono::Duration::days(older_than_days as i64);

    if !force && !json {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete log entries older than {older_than_days} days?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let deleted = service.delete_before(cutoff.timestamp_millis())?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        output::success(&format!("Deleted {deleted} log entries"));
    }
    Ok(())
}

fn stats(json: bool) -> Result<()> {
    let service = get_logging_service()?;
    let total = service.count()?;
    let errors = service.count_errors()?;
    let db_path = service.db_path().to_path_buf();
    let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "totalEntries": total,
                "errorCount": errors,
                "databasePath": db_path.to_string_lossy(),
                "databaseSizeBytes": size_bytes,
            })
        );
        return Ok(());
    }

    let mut table = output::create_table();
    table.add_row(vec!["Entries", &total.to_string()]);
    table.add_row(vec!["Errors", &errors.to_string()]);
    table.add_row(vec!["Database", &db_path.display().to_string()]);
    table.add_row(vec!["Size", &output::format_size(size_bytes)]);
    println!("{}", table);
    Ok(())
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List { limit, errors, json } => list(limit, errors, json),
        LogsCommands::Clear { older_than_days, force, json } => clear(older_than_days, force, json),
        LogsCommands::Export { output: path } => {
            let written = get_logging_service()?.export(&path)?;
            output::success(&format!("Logs exported to {}", written.display()));
            Ok(())
        }
        LogsCommands::Stats { json } => stats(json),
    }
}
