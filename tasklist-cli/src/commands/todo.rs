//! Todo commands - list, add, edit, toggle, delete, stats

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use colored::Colorize;
use dialoguer::Confirm;

use super::{
    emit_json, get_context, get_logger, log_event, log_failure, require_user, resolve_todo,
    user_facing,
};
use crate::output;
use tasklist_core::domain::messages;
use tasklist_core::services::{EntryPoint, LogEvent};
use tasklist_core::{TaskListContext, Todo, TodoPatch, TodoStats};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Filter {
    All,
    Open,
    Done,
}

impl Filter {
    fn keep(self, todo: &Todo) -> bool {
        match self {
            Filter::All => true,
            Filter::Open => !todo.is_completed,
            Filter::Done => todo.is_completed,
        }
    }
}

async fn owner_todos(ctx: &TaskListContext, owner: &str) -> Result<Vec<Todo>> {
    let pb = output::spinner("Loading todos...");
    let result = ctx.todo_service.list(owner).await;
    pb.finish_and_clear();
    result.map_err(user_facing)
}

async fn find_todo(ctx: &TaskListContext, owner: &str, reference: &str) -> Result<Todo> {
    let todos = owner_todos(ctx, owner).await?;
    resolve_todo(&todos, reference)
        .cloned()
        .ok_or_else(|| anyhow!(messages::TODO_NOT_FOUND))
}

pub async fn list(filter: Filter, json: bool) -> Result<()> {
    let ctx = get_context().await?;
    let user = require_user(&ctx).await?;
    let todos = owner_todos(&ctx, &user.id).await?;
    let stats = TodoStats::from_todos(&todos);
    let shown: Vec<Todo> = todos.into_iter().filter(|t| filter.keep(t)).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "todos": shown, "stats": stats }))?
        );
        return Ok(());
    }

    if shown.is_empty() {
        println!("{}", "No todos yet. Add one with 'tasks add <title>'.".dimmed());
    } else {
        println!("{}", output::todo_table(&shown));
    }
    println!("{}", output::stats_line(&stats));
    Ok(())
}

pub async fn add(title: &str, description: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Cli);
    let user = require_user(&ctx).await?;

    let result = ctx
        .todo_service
        .create(&user.id, title, description.unwrap_or(""))
        .await;
    match &result {
        Ok(_) => log_event(&logger, LogEvent::new("todo_created").with_backend(ctx.backend_name())),
        Err(e) => log_failure(&logger, "todo_create_failed", ctx.backend_name(), e),
    }
    if json {
        return emit_json(result);
    }

    let todo = result.map_err(user_facing)?;
    output::success(&format!("Added \"{}\" ({})", todo.title, output::short_id(&todo.id)));
    Ok(())
}

pub async fn edit(
    reference: &str,
    title: Option<String>,
    description: Option<String>,
    completed: Option<bool>,
    json: bool,
) -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Cli);
    let user = require_user(&ctx).await?;

    let mut patch = TodoPatch::default();
    if let Some(title) = title {
        patch = patch.title(title);
    }
    if let Some(description) = description {
        patch = patch.description(description);
    }
    if let Some(completed) = completed {
        patch = patch.completed(completed);
    }
    // Check the patch before looking anything up
    patch.normalized().map_err(user_facing)?;

    let id = match find_todo(&ctx, &user.id, reference).await {
        Ok(todo) => todo.id,
        // Unknown references go to the backend as ids and fail there
        Err(_) => reference.to_string(),
    };

    let result = ctx.todo_service.update(&id, &patch).await;
    match &result {
        Ok(_) => log_event(&logger, LogEvent::new("todo_updated").with_backend(ctx.backend_name())),
        Err(e) => log_failure(&logger, "todo_update_failed", ctx.backend_name(), e),
    }
    if json {
        return emit_json(result);
    }

    let todo = result.map_err(user_facing)?;
    output::success(&format!("Updated \"{}\"", todo.title));
    Ok(())
}

pub async fn toggle(reference: &str, json: bool) -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Cli);
    let user = require_user(&ctx).await?;
    let target = find_todo(&ctx, &user.id, reference).await?;

    let result = ctx.todo_service.toggle_completion(&target.id).await;
    if let Err(e) = &result {
        log_failure(&logger, "todo_toggle_failed", ctx.backend_name(), e);
    }
    if json {
        return emit_json(result);
    }

    let todo = result.map_err(user_facing)?;
    if todo.is_completed {
        output::success(&format!("✓ \"{}\" done", todo.title));
    } else {
        output::info(&format!("\"{}\" reopened", todo.title));
    }
    Ok(())
}

pub async fn delete(reference: &str, force: bool) -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Cli);
    let user = require_user(&ctx).await?;
    let target = find_todo(&ctx, &user.id, reference).await?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete \"{}\"?", target.title))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    if let Err(e) = ctx.todo_service.delete(&target.id).await {
        log_failure(&logger, "todo_delete_failed", ctx.backend_name(), &e);
        return Err(user_facing(e));
    }
    log_event(&logger, LogEvent::new("todo_deleted").with_backend(ctx.backend_name()));
    output::success(&format!("Deleted \"{}\"", target.title));
    Ok(())
}

pub async fn stats(json: bool) -> Result<()> {
    let ctx = get_context().await?;
    let user = require_user(&ctx).await?;
    let stats = ctx.todo_service.stats(&user.id).await.map_err(user_facing)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let mut table = output::create_table();
    table.add_row(vec!["Total", &stats.total.to_string()]);
    table.add_row(vec!["Completed", &stats.completed.to_string()]);
    table.add_row(vec!["Remaining", &stats.remaining.to_string()]);
    println!("{}", table);
    Ok(())
}
