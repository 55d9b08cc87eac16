//! CLI command implementations

pub mod auth;
pub mod demo;
pub mod logs;
pub mod shell;
pub mod todo;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::warn;
use tasklist_core::services::{EntryPoint, LogEvent, LoggingService};
use tasklist_core::{Error, OperationResult, TaskListContext, Todo, User};

/// Get the logging service for CLI operations
///
/// Returns None if the event log can't be opened; commands still run without it.
pub fn get_logger(entry_point: EntryPoint) -> Option<LoggingService> {
    open_logger(&get_dir(), entry_point)
}

fn open_logger(dir: &Path, entry_point: EntryPoint) -> Option<LoggingService> {
    let opened = std::fs::create_dir_all(dir)
        .map_err(anyhow::Error::from)
        .and_then(|()| LoggingService::new(dir, entry_point, env!("CARGO_PKG_VERSION")));
    match opened {
        Ok(logger) => Some(logger),
        Err(e) => {
            warn!(error = %e, "event log unavailable");
            None
        }
    }
}

/// Record an event; failures are reported as diagnostics only
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            warn!(error = %e, "failed to write event log");
        }
    }
}

/// Record a failed operation; only backend failures go to the log
pub fn log_failure(logger: &Option<LoggingService>, event: &str, backend: &str, err: &Error) {
    if err.is_remote() {
        log_event(
            logger,
            LogEvent::new(event)
                .with_backend(backend)
                .with_error(err.user_message())
                .with_error_details(err.to_string()),
        );
    }
}

/// Get the data directory from environment or default
pub fn get_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TASKLIST_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".tasklist"))
        .unwrap_or_else(|| PathBuf::from(".tasklist"))
}

/// Build the context and bring back the saved session
pub async fn get_context() -> Result<TaskListContext> {
    let dir = get_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create data directory: {:?}", dir))?;

    let ctx = TaskListContext::new(&dir)
        .await
        .context("Failed to initialize tasklist context")?;
    ctx.resume_session().await?;
    Ok(ctx)
}

/// The signed-in user, or an error telling the user to sign in
pub async fn require_user(ctx: &TaskListContext) -> Result<User> {
    ctx.auth_service
        .current_user()
        .await?
        .ok_or_else(|| anyhow!("Not signed in. Run 'tasks login' first."))
}

/// Resolve a todo reference: a 1-based position in `todos` or an id
pub fn resolve_todo<'a>(todos: &'a [Todo], reference: &str) -> Option<&'a Todo> {
    if let Ok(position) = reference.parse::<usize>() {
        if position >= 1 && position <= todos.len() {
            return todos.get(position - 1);
        }
    }
    todos
        .iter()
        .find(|t| t.id == reference || (reference.len() >= 4 && t.id.starts_with(reference)))
}

/// Turn a library error into the message the user should see
pub fn user_facing(err: Error) -> anyhow::Error {
    anyhow!(err.user_message())
}

/// Print the outcome of a write as a JSON envelope; a failure still exits non-zero
pub fn emit_json<T: Serialize>(result: tasklist_core::domain::result::Result<T>) -> Result<()> {
    let outcome = OperationResult::from(result);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    match outcome.error {
        Some(message) => Err(anyhow!(message)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_logger(dir.path(), EntryPoint::Cli).is_some());

        // A regular file where the data directory should be
        let blocked = dir.path().join("not-a-dir");
        std::fs::write(&blocked, b"").unwrap();
        assert!(open_logger(&blocked.join("nested"), EntryPoint::Cli).is_none());

        log_event(&None, LogEvent::new("ignored"));
    }
}
