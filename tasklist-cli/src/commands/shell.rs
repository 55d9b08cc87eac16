//! Interactive shell - a page-by-page front end over the route table
//!
//! Each screen corresponds to a route. Gated routes redirect to the login
//! screen whenever nobody is signed in, including when the session ends
//! while the shell is open.

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Confirm, Input, Password};
use tracing::warn;

use super::{get_context, get_logger, log_failure, resolve_todo};
use crate::output;
use tasklist_core::domain::Route;
use tasklist_core::services::{
    validate_registration, EntryPoint, LoggingService, SessionTracker, TodoSync,
};
use tasklist_core::{Error, TaskListContext, Todo, TodoPatch};

/// What the user asked for on the current screen
enum Action {
    Stay,
    Go(Route),
    Quit,
}

/// Blocking prompts run off the async workers so change notifications keep flowing
async fn prompt<T, F>(ask: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> dialoguer::Result<T> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(ask).await??)
}

async fn read_line(label: String) -> Result<String> {
    prompt(move || Input::<String>::new().with_prompt(label).allow_empty(true).interact_text()).await
}

async fn read_secret(label: &'static str) -> Result<String> {
    prompt(move || Password::new().with_prompt(label).interact()).await
}

async fn confirm(label: String) -> Result<bool> {
    prompt(move || Confirm::new().with_prompt(label).default(false).interact()).await
}

fn record_route(logger: &Option<LoggingService>, route: &Route) {
    if let Some(logger) = logger {
        if let Err(e) = logger.log_route(route) {
            warn!(error = %e, "failed to write event log");
        }
    }
}

struct Shell {
    ctx: TaskListContext,
    session: SessionTracker,
    todos: TodoSync,
    logger: Option<LoggingService>,
    route: Route,
}

impl Shell {
    fn report(&self, event: &str, err: &Error) {
        log_failure(&self.logger, event, self.ctx.backend_name(), err);
        output::error(&err.user_message());
    }

    /// Point the todo view at whoever is signed in now
    async fn follow_session(&self) {
        let owner = self.session.user().await.map(|u| u.id);
        if let Err(e) = self.todos.activate(owner.as_deref()).await {
            self.report("todo_sync_failed", &e);
        }
    }

    async fn navigate(&mut self, route: Route) {
        let authenticated = self.session.is_authenticated().await;
        let route = route.guard(authenticated);
        if route != self.route {
            record_route(&self.logger, &route);
        }
        self.route = route;
    }

    fn header(&self) {
        println!();
        println!("{} {}", "tasks".bold(), self.route.path().dimmed());
    }

    async fn step(&mut self) -> Result<Action> {
        self.follow_session().await;
        self.header();

        match self.route.clone() {
            Route::Home => self.home().await,
            Route::Login => self.login().await,
            Route::Register => self.register().await,
            Route::TodoList => self.todo_list().await,
            Route::TodoEdit(id) => self.todo_edit(&id).await,
        }
    }

    /// Commands available everywhere; None means the line wasn't one of them
    fn common(&self, line: &str) -> Option<Action> {
        let mut parts = line.splitn(2, ' ');
        match (parts.next()?, parts.next().map(str::trim)) {
            ("quit" | "exit" | "q", _) => Some(Action::Quit),
            ("go", Some(path)) => match path.parse::<Route>() {
                Ok(route) => Some(Action::Go(route)),
                Err(e) => {
                    output::error(&e.user_message());
                    Some(Action::Stay)
                }
            },
            ("help" | "?", _) => {
                println!("{}", "go <path>  open a page (/, /login, /register, /todo)".dimmed());
                println!("{}", "quit       leave the shell".dimmed());
                Some(Action::Stay)
            }
            _ => None,
        }
    }

    async fn home(&mut self) -> Result<Action> {
        println!("Keep track of what needs doing, on every device.");
        if let Some(user) = self.session.user().await {
            println!("Signed in as {}. Type 'todos' to open your list.", user.email.bold());
        } else {
            println!("Type 'login' or 'register' to get started.");
        }

        let line = read_line("home".to_string()).await?;
        if let Some(action) = self.common(line.trim()) {
            return Ok(action);
        }
        Ok(match line.trim() {
            "login" => Action::Go(Route::Login),
            "register" => Action::Go(Route::Register),
            "todos" | "list" => Action::Go(Route::TodoList),
            "" => Action::Stay,
            other => {
                output::warning(&format!("Unknown command: {other}"));
                Action::Stay
            }
        })
    }

    async fn login(&mut self) -> Result<Action> {
        if self.session.is_authenticated().await {
            return Ok(Action::Go(Route::after_sign_in()));
        }
        println!("Sign in ('register' to create an account, 'quit' to leave)");

        let email = read_line("Email".to_string()).await?;
        if let Some(action) = self.common(email.trim()) {
            return Ok(action);
        }
        if email.trim() == "register" {
            return Ok(Action::Go(Route::Register));
        }
        let password = read_secret("Password").await?;

        match self.session.sign_in(email.trim(), &password).await {
            Ok(session) => {
                self.ctx.persist_session().await?;
                output::success(&format!("Signed in as {}", session.user.email));
                Ok(Action::Go(Route::after_sign_in()))
            }
            Err(e) => {
                self.report("sign_in_failed", &e);
                Ok(Action::Stay)
            }
        }
    }

    async fn register(&mut self) -> Result<Action> {
        println!("Create an account ('login' if you already have one)");

        let email = read_line("Email".to_string()).await?;
        if let Some(action) = self.common(email.trim()) {
            return Ok(action);
        }
        if email.trim() == "login" {
            return Ok(Action::Go(Route::Login));
        }
        let password = read_secret("Password").await?;
        let confirmation = read_secret("Confirm password").await?;

        if let Err(e) = validate_registration(email.trim(), &password, &confirmation) {
            output::error(&e.user_message());
            return Ok(Action::Stay);
        }

        match self.session.sign_up(email.trim(), &password).await {
            Ok(Some(_)) => {
                self.ctx.persist_session().await?;
                output::success("Account created");
                Ok(Action::Go(Route::after_sign_in()))
            }
            Ok(None) => {
                output::info("Account created. Confirm your email address, then sign in.");
                Ok(Action::Go(Route::Login))
            }
            Err(e) => {
                self.report("sign_up_failed", &e);
                Ok(Action::Stay)
            }
        }
    }

    async fn todo_list(&mut self) -> Result<Action> {
        let snapshot = self.todos.snapshot().await;
        if snapshot.loading {
            println!("{}", "Loading...".dimmed());
        } else if snapshot.todos.is_empty() {
            println!("{}", "No todos yet. Type 'add' to create one.".dimmed());
        } else {
            println!("{}", output::todo_table(&snapshot.todos));
        }
        println!("{}", output::stats_line(&snapshot.stats));
        if let Some(error) = &snapshot.error {
            output::error(error);
        }
        println!(
            "{}",
            "add · toggle <#> · edit <#> · delete <#> · refresh · logout".dimmed()
        );

        let line = read_line("todo".to_string()).await?;
        let line = line.trim();
        if let Some(action) = self.common(line) {
            return Ok(action);
        }

        let mut parts = line.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().map(str::trim).unwrap_or_default();
        let target = resolve_todo(&snapshot.todos, argument).cloned();

        match (command, target) {
            ("", _) | ("refresh", _) => {
                if let Err(e) = self.todos.refresh().await {
                    self.report("todo_refresh_failed", &e);
                }
            }
            ("add", _) => self.add(argument).await?,
            ("toggle" | "t", Some(todo)) => {
                if let Err(e) = self.todos.toggle(&todo.id).await {
                    self.report("todo_toggle_failed", &e);
                }
            }
            ("edit" | "e", Some(todo)) => return Ok(Action::Go(Route::TodoEdit(todo.id))),
            ("delete" | "rm", Some(todo)) => self.delete(&todo).await?,
            ("logout", _) => {
                match self.session.sign_out().await {
                    Ok(()) => {
                        self.ctx.persist_session().await?;
                        output::success("Signed out");
                    }
                    Err(e) => self.report("sign_out_failed", &e),
                }
                return Ok(Action::Go(Route::after_sign_out()));
            }
            ("toggle" | "t" | "edit" | "e" | "delete" | "rm", None) => {
                output::error(tasklist_core::domain::messages::TODO_NOT_FOUND);
            }
            (other, _) => output::warning(&format!("Unknown command: {other}")),
        }
        Ok(Action::Stay)
    }

    async fn add(&mut self, inline_title: &str) -> Result<()> {
        let title = if inline_title.is_empty() {
            read_line("Title".to_string()).await?
        } else {
            inline_title.to_string()
        };
        // Same rule the service enforces, checked before asking for more
        if title.trim().is_empty() {
            output::error(tasklist_core::domain::messages::TITLE_REQUIRED);
            return Ok(());
        }
        let description = read_line("Description (optional)".to_string()).await?;

        match self.todos.create(&title, &description).await {
            Ok(todo) => output::success(&format!("Added \"{}\"", todo.title)),
            Err(e) => self.report("todo_create_failed", &e),
        }
        Ok(())
    }

    async fn delete(&mut self, todo: &Todo) -> Result<()> {
        if !confirm(format!("Delete \"{}\"?", todo.title)).await? {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
        match self.todos.delete(&todo.id).await {
            Ok(()) => output::success("Deleted"),
            Err(e) => self.report("todo_delete_failed", &e),
        }
        Ok(())
    }

    async fn todo_edit(&mut self, id: &str) -> Result<Action> {
        let Some(todo) = self.todos.find(id).await else {
            output::error(tasklist_core::domain::messages::TODO_NOT_FOUND);
            return Ok(Action::Go(Route::after_edit()));
        };

        println!("Editing \"{}\" (leave a field blank to keep it, 'cancel' to go back)", todo.title);
        let title = read_line(format!("Title [{}]", todo.title)).await?;
        if title.trim() == "cancel" {
            return Ok(Action::Go(Route::after_edit()));
        }
        let description = read_line(format!("Description [{}]", todo.description)).await?;
        let completed = confirm("Completed?".to_string()).await?;

        let mut patch = TodoPatch::default();
        if !title.trim().is_empty() {
            patch = patch.title(title);
        }
        if !description.trim().is_empty() {
            patch = patch.description(description);
        }
        if completed != todo.is_completed {
            patch = patch.completed(completed);
        }
        if patch.is_empty() {
            output::info("Nothing changed");
            return Ok(Action::Go(Route::after_edit()));
        }

        match self.todos.update(&todo.id, &patch).await {
            Ok(updated) => {
                output::success(&format!("Saved \"{}\"", updated.title));
                Ok(Action::Go(Route::after_edit()))
            }
            Err(e) => {
                self.report("todo_update_failed", &e);
                Ok(Action::Stay)
            }
        }
    }
}

pub async fn run() -> Result<()> {
    let ctx = get_context().await?;
    let logger = get_logger(EntryPoint::Shell);

    let session = ctx.session_tracker();
    if let Err(e) = session.start().await {
        output::error(&e.user_message());
    }
    let todos = ctx.todo_sync();

    let mut shell = Shell {
        ctx,
        session,
        todos,
        logger,
        route: Route::Home,
    };
    record_route(&shell.logger, &Route::Home);
    if shell.ctx.config.demo_mode {
        output::info("Demo mode: signed in as the demo user; changes last until you quit.");
    }

    loop {
        match shell.step().await? {
            Action::Stay => {
                // A gated screen may have lost its session in the meantime
                let current = shell.route.clone();
                shell.navigate(current).await;
            }
            Action::Go(route) => shell.navigate(route).await,
            Action::Quit => break,
        }
    }

    shell.todos.deactivate().await;
    shell.ctx.persist_session().await?;
    Ok(())
}
