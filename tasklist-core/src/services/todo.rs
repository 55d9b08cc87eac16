//! Todo service - business rules over the todo store

use std::sync::Arc;

use tracing::debug;

use crate::domain::messages;
use crate::domain::result::{Error, Result};
use crate::domain::{ChangeEvent, Todo, TodoDraft, TodoPatch, TodoStats};
use crate::ports::{Subscription, TodoStore};

/// Validation and existence rules layered over a `TodoStore`
///
/// Every rule is checked before the store is called; invalid input never
/// reaches the backend.
pub struct TodoService {
    store: Arc<dyn TodoStore>,
}

impl TodoService {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }

    /// All of `owner`'s todos, newest first
    pub async fn list(&self, owner: &str) -> Result<Vec<Todo>> {
        self.store.list_by_owner(owner).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Todo>> {
        self.store.get_by_id(id).await
    }

    /// Create a todo with trimmed fields; the title must not be blank
    pub async fn create(&self, owner: &str, title: &str, description: &str) -> Result<Todo> {
        let draft = TodoDraft::new(title, description)?;
        self.create_draft(owner, draft).await
    }

    /// Create from an already validated draft
    pub async fn create_draft(&self, owner: &str, draft: TodoDraft) -> Result<Todo> {
        let todo = self.store.create(&draft.into_new_todo(owner)).await?;
        debug!(id = %todo.id, "todo created");
        Ok(todo)
    }

    /// Apply only the provided fields; the target must exist
    pub async fn update(&self, id: &str, patch: &TodoPatch) -> Result<Todo> {
        let patch = patch.normalized()?;
        if self.store.get_by_id(id).await?.is_none() {
            return Err(Error::not_found(messages::TODO_TO_UPDATE_NOT_FOUND));
        }

        self.store
            .update_by_id(id, &patch)
            .await?
            .ok_or_else(|| Error::not_found(messages::TODO_TO_UPDATE_NOT_FOUND))
    }

    /// Flip the completion flag
    ///
    /// Reads the current flag, then writes its negation conditioned on the
    /// flag still having that value. If another client changed it in
    /// between, nothing is written and the caller gets a conflict instead of
    /// silently overwriting the other change.
    pub async fn toggle_completion(&self, id: &str) -> Result<Todo> {
        let current = self
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(messages::TODO_NOT_FOUND))?;

        let expected = current.is_completed;
        match self.store.set_completion_if(id, expected, !expected).await? {
            Some(todo) => Ok(todo),
            None => match self.store.get_by_id(id).await? {
                None => Err(Error::not_found(messages::TODO_NOT_FOUND)),
                Some(_) => Err(Error::conflict(messages::TODO_CHANGED_ELSEWHERE)),
            },
        }
    }

    /// Delete an existing todo
    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.store.get_by_id(id).await?.is_none() {
            return Err(Error::not_found(messages::TODO_TO_DELETE_NOT_FOUND));
        }
        self.store.delete_by_id(id).await
    }

    pub async fn count(&self, owner: &str) -> Result<usize> {
        self.store.count_by_owner(owner).await
    }

    /// Totals computed from a fresh listing
    pub async fn stats(&self, owner: &str) -> Result<TodoStats> {
        let todos = self.store.list_by_owner(owner).await?;
        Ok(TodoStats::from_todos(&todos))
    }

    pub async fn subscribe(&self, owner: &str) -> Result<Subscription<ChangeEvent>> {
        self.store.subscribe(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBackend;
    use crate::ports::IdentityProvider;

    async fn setup() -> (Arc<InMemoryBackend>, TodoService, String) {
        let backend = Arc::new(InMemoryBackend::new());
        let session = backend
            .sign_up("service@example.com", "password1")
            .await
            .unwrap()
            .unwrap();
        let service = TodoService::new(backend.clone());
        (backend, service, session.user.id)
    }

    #[tokio::test]
    async fn test_create_trims_and_defaults() {
        let (_backend, service, owner) = setup().await;
        let todo = service.create(&owner, "  Buy milk  ", "  semi-skimmed ").await.unwrap();
        assert_eq!(todo.title, "Buy milk");
        assert_eq!(todo.description, "semi-skimmed");
        assert!(!todo.is_completed);
        assert_eq!(todo.user_id, owner);
    }

    #[tokio::test]
    async fn test_blank_title_never_reaches_the_store() {
        let (backend, service, owner) = setup().await;
        let calls = backend.call_count();
        let err = service.create(&owner, "   ", "desc").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(backend.call_count(), calls);
    }

    #[tokio::test]
    async fn test_update_applies_only_provided_fields() {
        let (_backend, service, owner) = setup().await;
        let todo = service.create(&owner, "Original", "keep me").await.unwrap();

        let updated = service
            .update(&todo.id, &TodoPatch::default().title("  Renamed "))
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.description, "keep me");

        let err = service
            .update(&todo.id, &TodoPatch::default().title(" "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_todo() {
        let (_backend, service, _owner) = setup().await;
        let err = service
            .update("missing", &TodoPatch::default().completed(true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == messages::TODO_TO_UPDATE_NOT_FOUND));

        let err = service.delete("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == messages::TODO_TO_DELETE_NOT_FOUND));

        let err = service.toggle_completion("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_flag() {
        let (_backend, service, owner) = setup().await;
        let todo = service.create(&owner, "Toggle", "").await.unwrap();

        let once = service.toggle_completion(&todo.id).await.unwrap();
        assert!(once.is_completed);
        let twice = service.toggle_completion(&todo.id).await.unwrap();
        assert!(!twice.is_completed);
    }

    #[tokio::test]
    async fn test_count_and_stats() {
        let (_backend, service, owner) = setup().await;
        let a = service.create(&owner, "a", "").await.unwrap();
        service.create(&owner, "b", "").await.unwrap();
        service.toggle_completion(&a.id).await.unwrap();

        assert_eq!(service.count(&owner).await.unwrap(), 2);
        assert_eq!(service.stats(&owner).await.unwrap(), TodoStats::new(2, 1));

        service.delete(&a.id).await.unwrap();
        assert!(service.get(&a.id).await.unwrap().is_none());
        assert_eq!(service.stats(&owner).await.unwrap(), TodoStats::new(1, 0));
    }

    #[tokio::test]
    async fn test_remote_failure_is_surfaced_unchanged() {
        let (backend, service, owner) = setup().await;
        backend.set_offline(true);
        let err = service.list(&owner).await.unwrap_err();
        assert!(err.is_remote());
    }
}
