//! Demo command - switch between the sample backend and Supabase

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::get_dir;
use tasklist_core::adapters::demo::{DEMO_EMAIL, DEMO_PASSWORD};
use tasklist_core::services::DemoService;

#[derive(Subcommand)]
pub enum DemoCommands {
    /// Use the built-in sample backend instead of Supabase
    #[command(name = "on")]
    On,
    /// Go back to the configured Supabase project
    #[command(name = "off")]
    Off,
    /// Show which backend is in use
    Status,
}

fn print_credentials() {
    println!(
        "{}",
        format!("Demo account: {DEMO_EMAIL} / {DEMO_PASSWORD}").dimmed()
    );
}

pub fn run(command: Option<DemoCommands>) -> Result<()> {
    let dir = get_dir();
    std::fs::create_dir_all(&dir)?;
    let demo = DemoService::new(&dir);

    match command {
        Some(DemoCommands::On) => {
            demo.enable()?;
            println!("{}", "Demo mode enabled".green());
            println!("Sample todos are recreated on every run; nothing reaches Supabase.");
            println!("Try 'tasks list' or 'tasks shell'.");
            print_credentials();
        }
        Some(DemoCommands::Off) => {
            demo.disable()?;
            println!("{}", "Demo mode disabled".yellow());
            println!("Sign in to your Supabase project with 'tasks login'.");
        }
        Some(DemoCommands::Status) | None => {
            if demo.is_enabled()? {
                println!("Backend: {} (demo)", "in-memory".green());
                print_credentials();
            } else {
                println!("Backend: {}", "supabase".cyan());
            }
        }
    }
    Ok(())
}
