//! Todo store port - access to the remote `todos` table

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{ChangeEvent, NewTodo, Todo, TodoPatch};

use super::Subscription;

/// Remote todo table abstraction
///
/// One method per operation; implementations map fields directly and surface
/// the backend's own error without retrying or caching.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Backend name (e.g., "supabase", "memory")
    fn name(&self) -> &str;

    /// All todos of `owner`, newest first
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Todo>>;

    /// Single todo by id, `None` when no visible row has it
    async fn get_by_id(&self, id: &str) -> Result<Option<Todo>>;

    /// Insert a row and return it as stored
    async fn create(&self, todo: &NewTodo) -> Result<Todo>;

    /// Write the provided fields; `None` when no row matched
    async fn update_by_id(&self, id: &str, patch: &TodoPatch) -> Result<Option<Todo>>;

    /// Set the completion flag only if it currently equals `expected`
    ///
    /// Returns the updated row, or `None` if the row is gone or its flag no
    /// longer matches. This is a single conditional write on the backend.
    async fn set_completion_if(&self, id: &str, expected: bool, value: bool)
        -> Result<Option<Todo>>;

    /// Remove a row; deleting a missing row is not an error at this layer
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Number of todos owned by `owner`
    async fn count_by_owner(&self, owner: &str) -> Result<usize>;

    /// Push channel of changes to `owner`'s rows
    async fn subscribe(&self, owner: &str) -> Result<Subscription<ChangeEvent>>;
}
