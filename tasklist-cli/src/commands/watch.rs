//! Watch command - live todo list that follows changes made elsewhere

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::warn;

use super::{get_context, get_logger, log_event, require_user, user_facing};
use crate::output;
use tasklist_core::services::{EntryPoint, LogEvent, SyncSnapshot};

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

fn render(snapshot: &SyncSnapshot, email: &str) {
    // Clear screen and home the cursor
    print!("\x1B[2J\x1B[H");
    println!("{} {}", "Watching todos for".dimmed(), email.bold());
    println!("{}", "Press Ctrl-C to stop".dimmed());
    println!();

    if snapshot.loading {
        println!("{}", "Loading...".dimmed());
    } else if snapshot.todos.is_empty() {
        println!("{}", "No todos yet.".dimmed());
    } else {
        println!("{}", output::todo_table(&snapshot.todos));
    }
    println!("{}", output::stats_line(&snapshot.stats));
    if let Some(error) = &snapshot.error {
        output::error(error);
    }
}

pub async fn run() -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Cli);
    let user = require_user(&ctx).await?;

    let sync = ctx.todo_sync();
    sync.activate(Some(&user.id)).await.map_err(user_facing)?;
    log_event(&logger, LogEvent::new("watch_started").with_backend(ctx.backend_name()));

    let mut ticker = interval(REDRAW_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<SyncSnapshot> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        if !sync.is_subscribed() {
            warn!("change subscription ended");
            output::warning("Live updates stopped. Sign in again with 'tasks login'.");
            break;
        }

        let snapshot = sync.snapshot().await;
        if last.as_ref() != Some(&snapshot) {
            render(&snapshot, &user.email);
            last = Some(snapshot);
        }
    }

    sync.deactivate().await;
    // Tokens may have been refreshed while watching
    ctx.persist_session().await?;
    println!();
    Ok(())
}
