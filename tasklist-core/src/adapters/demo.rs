//! Demo data
//!
//! Seeds the in-memory backend with one account and a handful of todos so
//! the app can be tried without a Supabase project:
//! - a demo user that is signed in right away
//! - a mix of open and finished todos, some with descriptions

use crate::adapters::memory::InMemoryBackend;
use crate::domain::result::Result;
use crate::domain::{Session, TodoDraft};
use crate::ports::IdentityProvider;

pub const DEMO_EMAIL: &str = "demo@tasklist.dev";
pub const DEMO_PASSWORD: &str = "demo-password";

/// (title, description, completed), oldest first
const DEMO_TODOS: &[(&str, &str, bool)] = &[
    ("Set up the project board", "Columns: backlog, doing, done", true),
    ("Buy groceries", "Milk, eggs, coffee beans", true),
    ("Book dentist appointment", "", false),
    ("Renew passport", "Photos are in the desk drawer", false),
    ("Water the plants", "", false),
    ("Call the landlord about the heating", "", false),
    ("Read chapter 4 of the Rust book", "Ownership and borrowing", true),
    ("Plan weekend hike", "Check the forecast on Friday", false),
];

/// Register the demo account, sign it in, and add the demo todos
pub async fn seed_demo_backend(backend: &InMemoryBackend) -> Result<Session> {
    let session = match backend.sign_up(DEMO_EMAIL, DEMO_PASSWORD).await? {
        Some(session) => session,
        None => backend.sign_in(DEMO_EMAIL, DEMO_PASSWORD).await?,
    };

    for (title, description, completed) in DEMO_TODOS {
        let mut new = TodoDraft::new(title, description)?.into_new_todo(&session.user.id);
        new.is_completed = *completed;
        backend.seed_todo(new);
    }

    Ok(session)
}
