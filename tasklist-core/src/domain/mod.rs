//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod change;
pub mod messages;
pub mod result;
pub mod route;
mod todo;
mod user;

pub use change::{ChangeEvent, TodoStats};
pub use route::Route;
pub use todo::{NewTodo, Todo, TodoDraft, TodoPatch};
pub use user::{Session, User};
