//! Service layer - business logic orchestration
//!
//! Services coordinate domain rules and port interactions. `TodoService`
//! and `AuthService` are stateless rule layers; `TodoSync` and
//! `SessionTracker` hold the live state a front end renders.

mod auth;
mod demo;
pub mod logging;
mod session;
mod todo;
pub mod todo_sync;

pub use auth::{validate_registration, validate_sign_up, AuthService};
pub use demo::DemoService;
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use session::{SessionState, SessionTracker};
pub use todo::TodoService;
pub use todo_sync::{is_local_id, RemoteOutcome, SyncSnapshot, TodoSync};
