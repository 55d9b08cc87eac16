//! Account commands - register, login, logout, whoami

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Input, Password};

use super::{get_context, log_event, log_failure, user_facing};
use crate::output;
use tasklist_core::services::{validate_registration, EntryPoint, LogEvent};

fn ask_email(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => Ok(Input::new().with_prompt("Email").interact_text()?),
    }
}

fn ask_password(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => Ok(Password::new().with_prompt("Password").interact()?),
    }
}

pub async fn register(email: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = get_context().await?;
    let logger = super::get_logger(EntryPoint::Cli);

    let email = ask_email(email)?;
    let (password, confirmation) = match password {
        Some(password) => (password.clone(), password),
        None => {
            let p1 = Password::new().with_prompt("Password").interact()?;
            let p2 = Password::new().with_prompt("Confirm password").interact()?;
            (p1, p2)
        }
    };
    validate_registration(&email, &password, &confirmation).map_err(user_facing)?;

    let pb = output::spinner("Creating account...");
    let result = ctx.auth_service.sign_up(&email, &password).await;
    pb.finish_and_clear();

    match result {
        Ok(Some(session)) => {
            ctx.persist_session().await?;
            log_event(&logger, LogEvent::new("signed_up").with_backend(ctx.backend_name()));
            output::success(&format!("Signed in as {}", session.user.email));
        }
        Ok(None) => {
            output::info("Account created. Confirm your email address, then run 'tasks login'.");
        }
        Err(e) => {
            log_failure(&logger, "sign_up_failed", ctx.backend_name(), &e);
            return Err(user_facing(e));
        }
    }
    Ok(())
}

pub async fn login(email: Option<String>, password: Option<String>) -> Result<()> {
    let ctx = get_context().await?;
    let logger = super::get_logger(EntryPoint::Cli);

    let email = ask_email(email)?;
    let password = ask_password(password)?;

    let pb = output::spinner("Signing in...");
    let result = ctx.auth_service.sign_in(&email, &password).await;
    pb.finish_and_clear();

    match result {
        Ok(session) => {
            ctx.persist_session().await?;
            log_event(&logger, LogEvent::new("signed_in").with_backend(ctx.backend_name()));
            output::success(&format!("Signed in as {}", session.user.email));
            Ok(())
        }
        Err(e) => {
            log_failure(&logger, "sign_in_failed", ctx.backend_name(), &e);
            Err(user_facing(e))
        }
    }
}

pub async fn logout() -> Result<()> {
    let ctx = get_context().await?;
    if ctx.auth_service.current_user().await?.is_none() {
        output::info("Not signed in");
        return Ok(());
    }

    ctx.auth_service.sign_out().await.map_err(user_facing)?;
    ctx.persist_session().await?;
    output::success("Signed out");
    Ok(())
}

pub async fn whoami(json: bool) -> Result<()> {
    let ctx = get_context().await?;
    let user = ctx.auth_service.current_user().await.map_err(user_facing)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user": user,
                "backend": ctx.backend_name(),
                "demoMode": ctx.config.demo_mode,
            }))?
        );
        return Ok(());
    }

    match user {
        Some(user) => {
            println!("{} {}", "Signed in as".dimmed(), user.email.bold());
            println!("{} {}", "User ID:".dimmed(), user.id);
        }
        None => println!("{}", "Not signed in".yellow()),
    }
    if ctx.config.demo_mode {
        println!("{}", "Demo mode is ON".cyan());
    }
    Ok(())
}
