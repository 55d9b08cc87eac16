//! Tasklist CLI - your todo list in the terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{auth, demo, logs, shell, todo, watch};

/// Tasklist - your todo list in the terminal
#[derive(Parser)]
#[command(name = "tasks", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Register {
        /// Email address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Password (prompted if omitted)
        #[arg(long, env = "TASKLIST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign in
    Login {
        /// Email address (prompted if omitted)
        #[arg(long)]
        email: Option<String>,
        /// Password (prompted if omitted)
        #[arg(long, env = "TASKLIST_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the saved session
    Logout,

    /// Show who is signed in
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List your todos, newest first
    List {
        /// Which todos to show
        #[arg(long, value_enum, default_value = "all")]
        filter: todo::Filter,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a todo
    Add {
        /// Title of the todo
        title: String,
        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Edit a todo by list number or id
    Edit {
        /// List number (from 'tasks list') or id
        reference: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// Mark as completed
        #[arg(long, conflicts_with = "open")]
        done: bool,
        /// Mark as not completed
        #[arg(long)]
        open: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Flip a todo between done and open
    Toggle {
        /// List number (from 'tasks list') or id
        reference: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a todo
    Delete {
        /// List number (from 'tasks list') or id
        reference: String,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Show total, completed and remaining counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Live view of your todos, including changes made elsewhere
    Watch,

    /// Interactive shell with the login, register and todo screens
    Shell,

    /// View and manage application logs
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },

    /// Manage demo mode
    Demo {
        #[command(subcommand)]
        command: Option<demo::DemoCommands>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Register { .. } => "register",
            Commands::Login { .. } => "login",
            Commands::Logout => "logout",
            Commands::Whoami { .. } => "whoami",
            Commands::List { .. } => "list",
            Commands::Add { .. } => "add",
            Commands::Edit { .. } => "edit",
            Commands::Toggle { .. } => "toggle",
            Commands::Delete { .. } => "delete",
            Commands::Stats { .. } => "stats",
            Commands::Watch => "watch",
            Commands::Shell => "shell",
            Commands::Logs { .. } => "logs",
            Commands::Demo { .. } => "demo",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TASKLIST_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // The logs command reads the log; recording it there would only add noise
    if !matches!(cli.command, Commands::Logs { .. }) {
        if let Some(logger) = commands::get_logger(tasklist_core::services::EntryPoint::Cli) {
            if let Err(e) = logger.log_command(cli.command.name()) {
                tracing::warn!(error = %e, "failed to write event log");
            }
        }
    }

    match cli.command {
        Commands::Register { email, password } => auth::register(email, password).await,
        Commands::Login { email, password } => auth::login(email, password).await,
        Commands::Logout => auth::logout().await,
        Commands::Whoami { json } => auth::whoami(json).await,
        Commands::List { filter, json } => todo::list(filter, json).await,
        Commands::Add { title, description, json } => {
            todo::add(&title, description.as_deref(), json).await
        }
        Commands::Edit { reference, title, description, done, open, json } => {
            let completed = match (done, open) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            todo::edit(&reference, title, description, completed, json).await
        }
        Commands::Toggle { reference, json } => todo::toggle(&reference, json).await,
        Commands::Delete { reference, force } => todo::delete(&reference, force).await,
        Commands::Stats { json } => todo::stats(json).await,
        Commands::Watch => watch::run().await,
        Commands::Shell => shell::run().await,
        Commands::Logs { command } => logs::run(command),
        Commands::Demo { command } => demo::run(command),
    }
}
