//! Output formatting utilities

use std::time::Duration;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tasklist_core::services::is_local_id;
use tasklist_core::{Todo, TodoStats};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Spinner shown while waiting on the backend
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Numbered todo table; the number is what other commands accept
pub fn todo_table(todos: &[Todo]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["#", "", "Title", "Description", "Created", "ID"]);

    for (i, todo) in todos.iter().enumerate() {
        let mark = if todo.is_completed {
            Cell::new("✓").fg(Color::Green)
        } else {
            Cell::new("·")
        };
        let title = if todo.is_completed {
            Cell::new(&todo.title).fg(Color::DarkGrey)
        } else {
            Cell::new(&todo.title)
        };
        let id = if is_local_id(&todo.id) {
            Cell::new("saving…").fg(Color::Yellow)
        } else {
            Cell::new(short_id(&todo.id))
        };

        table.add_row(vec![
            Cell::new(i + 1),
            mark,
            title,
            Cell::new(&todo.description),
            Cell::new(todo.created_at.format("%Y-%m-%d %H:%M").to_string()),
            id,
        ]);
    }

    table
}

/// One-line summary of the counts
pub fn stats_line(stats: &TodoStats) -> String {
    format!(
        "{} total · {} done · {} remaining",
        stats.total.to_string().bold(),
        stats.completed.to_string().green(),
        stats.remaining.to_string().yellow()
    )
}

/// First eight characters of an id
pub fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match bytes {
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} bytes"),
    }
}
