//! In-memory backend
//!
//! A complete stand-in for the hosted service: a `todos` table with
//! row-level ownership checks, password accounts, sessions, and push
//! notifications for both row changes and session changes. Demo mode runs on
//! it, and so does the test suite, which also uses the failure switches to
//! exercise rollback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::messages::{BACKEND_INVALID_CREDENTIALS, SESSION_EXPIRED};
use crate::domain::result::{Error, Result};
use crate::domain::{ChangeEvent, NewTodo, Session, Todo, TodoPatch, User};
use crate::ports::{IdentityProvider, Subscribers, Subscription, TodoStore};

/// Session-change scope; there is one signed-in slot per backend instance
const SESSION_SCOPE: &str = "session";

/// Lifetime of issued access tokens
const TOKEN_TTL_SECS: i64 = 3600;

struct Account {
    user: User,
    salt: String,
    password_hash: String,
}

#[derive(Default)]
struct MemoryState {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    /// access token -> user id
    tokens: HashMap<String, String>,
    current: Option<Session>,
    /// Newest first
    todos: Vec<Todo>,
}

impl MemoryState {
    fn session_user_id(&self) -> Option<&str> {
        self.current.as_ref().map(|s| s.user.id.as_str())
    }

    fn visible(&self, todo: &Todo) -> bool {
        self.session_user_id() == Some(todo.user_id.as_str())
    }

    fn position_visible(&self, id: &str) -> Option<usize> {
        self.todos
            .iter()
            .position(|t| t.id == id && self.visible(t))
    }
}

/// In-memory implementation of both backend ports
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    changes: Subscribers<ChangeEvent>,
    sessions: Subscribers<Option<User>>,
    offline: AtomicBool,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            changes: Subscribers::new(),
            sessions: Subscribers::new(),
            offline: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every call fail with a network error until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make the next `n` calls fail with a backend error
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of remote calls served (including failed ones)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Open change subscriptions for `owner`
    pub fn active_subscriptions(&self, owner: &str) -> usize {
        self.changes.active(owner)
    }

    /// Rows of every owner, bypassing row-level checks
    pub fn all_todos(&self) -> Vec<Todo> {
        self.lock().todos.clone()
    }

    /// Write a row as another client of the same account would
    ///
    /// Emits the same notification a regular update does.
    pub fn apply_external_update(&self, id: &str, patch: &TodoPatch) -> Option<Todo> {
        let event = {
            let mut state = self.lock();
            let index = state.todos.iter().position(|t| t.id == id)?;
            let old = state.todos[index].clone();
            state.todos[index].apply_patch(patch, Utc::now());
            ChangeEvent::Update {
                old,
                new: state.todos[index].clone(),
            }
        };
        self.publish(&event);
        match event {
            ChangeEvent::Update { new, .. } => Some(new),
            _ => None,
        }
    }

    /// Insert a row for `owner` without a session, as seeding does
    pub fn seed_todo(&self, new: NewTodo) -> Todo {
        let todo = Todo::from_new(Uuid::new_v4().to_string(), new, Utc::now());
        self.lock().todos.insert(0, todo.clone());
        self.publish(&ChangeEvent::Insert { new: todo.clone() });
        todo
    }

    /// Drop the signed-in slot without revoking its token, as a restarted
    /// client would see it
    pub fn forget_current_session(&self) {
        self.lock().current = None;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count the call and apply the failure switches
    fn check_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::remote("error sending request: network unreachable"));
        }
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::remote("503 Service Unavailable"));
        }
        Ok(())
    }

    fn publish(&self, event: &ChangeEvent) {
        self.changes.publish(event.owner(), event);
    }

    fn publish_session(&self, user: Option<User>) {
        self.sessions.publish(SESSION_SCOPE, &user);
    }

    fn hash_password(salt: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn issue_session(state: &mut MemoryState, user: &User) -> Session {
        let access_token = Uuid::new_v4().to_string();
        state.tokens.insert(access_token.clone(), user.id.clone());
        let session = Session {
            access_token,
            refresh_token: Some(Uuid::new_v4().to_string()),
            expires_at: Some(Utc::now().timestamp() + TOKEN_TTL_SECS),
            user: user.clone(),
        };
        state.current = Some(session.clone());
        session
    }
}

#[async_trait]
impl TodoStore for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Todo>> {
        self.check_call()?;
        let state = self.lock();
        let mut todos: Vec<Todo> = state
            .todos
            .iter()
            .filter(|t| t.user_id == owner && state.visible(t))
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Todo>> {
        self.check_call()?;
        let state = self.lock();
        Ok(state.position_visible(id).map(|i| state.todos[i].clone()))
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo> {
        self.check_call()?;
        let created = {
            let mut state = self.lock();
            if state.session_user_id() != Some(todo.user_id.as_str()) {
                return Err(Error::remote(
                    "new row violates row-level security policy for table \"todos\"",
                ));
            }
            let created = Todo::from_new(Uuid::new_v4().to_string(), todo.clone(), Utc::now());
            state.todos.insert(0, created.clone());
            created
        };
        self.publish(&ChangeEvent::Insert { new: created.clone() });
        Ok(created)
    }

    async fn update_by_id(&self, id: &str, patch: &TodoPatch) -> Result<Option<Todo>> {
        self.check_call()?;
        let event = {
            let mut state = self.lock();
            let Some(index) = state.position_visible(id) else {
                return Ok(None);
            };
            let old = state.todos[index].clone();
            state.todos[index].apply_patch(patch, Utc::now());
            ChangeEvent::Update {
                old,
                new: state.todos[index].clone(),
            }
        };
        self.publish(&event);
        match event {
            ChangeEvent::Update { new, .. } => Ok(Some(new)),
            _ => Ok(None),
        }
    }

    async fn set_completion_if(
        &self,
        id: &str,
        expected: bool,
        value: bool,
    ) -> Result<Option<Todo>> {
        self.check_call()?;
        let event = {
            let mut state = self.lock();
            let Some(index) = state.position_visible(id) else {
                return Ok(None);
            };
            if state.todos[index].is_completed != expected {
                return Ok(None);
            }
            let old = state.todos[index].clone();
            state.todos[index].is_completed = value;
            state.todos[index].updated_at = Utc::now();
            ChangeEvent::Update {
                old,
                new: state.todos[index].clone(),
            }
        };
        self.publish(&event);
        match event {
            ChangeEvent::Update { new, .. } => Ok(Some(new)),
            _ => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.check_call()?;
        let removed = {
            let mut state = self.lock();
            state.position_visible(id).map(|i| state.todos.remove(i))
        };
        if let Some(old) = removed {
            self.publish(&ChangeEvent::Delete { old });
        }
        Ok(())
    }

    async fn count_by_owner(&self, owner: &str) -> Result<usize> {
        self.check_call()?;
        let state = self.lock();
        Ok(state
            .todos
            .iter()
            .filter(|t| t.user_id == owner && state.visible(t))
            .count())
    }

    async fn subscribe(&self, owner: &str) -> Result<Subscription<ChangeEvent>> {
        self.check_call()?;
        Ok(self.changes.subscribe(owner))
    }
}

#[async_trait]
impl IdentityProvider for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        self.check_call()?;
        let session = {
            let mut state = self.lock();
            let key = email.trim().to_lowercase();
            if state.accounts.contains_key(&key) {
                return Err(Error::remote("User already registered"));
            }
            let salt = hex::encode(rand::thread_rng().gen::<[u8; 16]>());
            let user = User::new(Uuid::new_v4().to_string(), email.trim());
            let password_hash = Self::hash_password(&salt, password);
            state.accounts.insert(
                key,
                Account {
                    user: user.clone(),
                    salt,
                    password_hash,
                },
            );
            Self::issue_session(&mut state, &user)
        };
        self.publish_session(Some(session.user.clone()));
        Ok(Some(session))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.check_call()?;
        let session = {
            let mut state = self.lock();
            let user = match state.accounts.get(&email.trim().to_lowercase()) {
                Some(account)
                    if Self::hash_password(&account.salt, password) == account.password_hash =>
                {
                    account.user.clone()
                }
                _ => return Err(Error::remote(BACKEND_INVALID_CREDENTIALS)),
            };
            Self::issue_session(&mut state, &user)
        };
        self.publish_session(Some(session.user.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.check_call()?;
        let was_signed_in = {
            let mut state = self.lock();
            match state.current.take() {
                Some(session) => {
                    state.tokens.remove(&session.access_token);
                    true
                }
                None => false,
            }
        };
        if was_signed_in {
            self.publish_session(None);
        }
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        self.check_call()?;
        Ok(self.lock().current.as_ref().map(|s| s.user.clone()))
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        self.check_call()?;
        Ok(self.lock().current.clone())
    }

    async fn restore_session(&self, session: Session) -> Result<()> {
        self.check_call()?;
        {
            let mut state = self.lock();
            if state.tokens.get(&session.access_token) != Some(&session.user.id) {
                return Err(Error::authentication(SESSION_EXPIRED));
            }
            state.current = Some(session.clone());
        }
        self.publish_session(Some(session.user));
        Ok(())
    }

    fn subscribe(&self) -> Subscription<Option<User>> {
        self.sessions.subscribe(SESSION_SCOPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TodoDraft;

    async fn signed_in(backend: &InMemoryBackend, email: &str) -> User {
        backend
            .sign_up(email, "secret-password")
            .await
            .unwrap()
            .unwrap()
            .user
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_the_session_user() {
        let backend = InMemoryBackend::new();
        let alice = signed_in(&backend, "alice@example.com").await;
        let draft = TodoDraft::new("Alice's task", "").unwrap();
        let todo = backend.create(&draft.into_new_todo(&alice.id)).await.unwrap();

        let bob = signed_in(&backend, "bob@example.com").await;
        assert!(backend.get_by_id(&todo.id).await.unwrap().is_none());
        assert!(backend.list_by_owner(&alice.id).await.unwrap().is_empty());
        assert_eq!(backend.count_by_owner(&bob.id).await.unwrap(), 0);

        let foreign = TodoDraft::new("Sneaky", "").unwrap().into_new_todo(&alice.id);
        assert!(matches!(backend.create(&foreign).await, Err(Error::Remote(_))));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let backend = InMemoryBackend::new();
        let user = signed_in(&backend, "order@example.com").await;
        for title in ["first", "second", "third"] {
            let new = TodoDraft::new(title, "").unwrap().into_new_todo(&user.id);
            backend.create(&new).await.unwrap();
        }
        let titles: Vec<String> = backend
            .list_by_owner(&user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_conditional_completion_write() {
        let backend = InMemoryBackend::new();
        let user = signed_in(&backend, "cas@example.com").await;
        let new = TodoDraft::new("flip me", "").unwrap().into_new_todo(&user.id);
        let todo = backend.create(&new).await.unwrap();

        let flipped = backend.set_completion_if(&todo.id, false, true).await.unwrap();
        assert!(flipped.unwrap().is_completed);

        // Stale expectation matches nothing
        assert!(backend.set_completion_if(&todo.id, false, true).await.unwrap().is_none());
        assert!(backend.set_completion_if("missing", false, true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_change_notifications_carry_pre_images() {
        let backend = InMemoryBackend::new();
        let user = signed_in(&backend, "events@example.com").await;
        let mut changes = TodoStore::subscribe(&backend, &user.id).await.unwrap();

        let new = TodoDraft::new("watch", "").unwrap().into_new_todo(&user.id);
        let todo = backend.create(&new).await.unwrap();
        backend
            .update_by_id(&todo.id, &TodoPatch::default().completed(true))
            .await
            .unwrap();
        backend.delete_by_id(&todo.id).await.unwrap();

        assert!(matches!(changes.recv().await, Some(ChangeEvent::Insert { .. })));
        match changes.recv().await {
            Some(ChangeEvent::Update { old, new }) => {
                assert!(!old.is_completed);
                assert!(new.is_completed);
            }
            other => panic!("expected update, got {other:?}"),
        }
        match changes.recv().await {
            Some(ChangeEvent::Delete { old }) => assert!(old.is_completed),
            other => panic!("expected delete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sign_in_with_wrong_password() {
        let backend = InMemoryBackend::new();
        signed_in(&backend, "who@example.com").await;
        backend.sign_out().await.unwrap();

        let err = backend.sign_in("who@example.com", "nope").await.unwrap_err();
        assert!(err.to_string().contains(BACKEND_INVALID_CREDENTIALS));
        assert!(backend.current_user().await.unwrap().is_none());

        let session = backend.sign_in("WHO@example.com", "secret-password").await.unwrap();
        assert_eq!(session.user.email, "who@example.com");
    }

    #[tokio::test]
    async fn test_session_notifications_and_restore() {
        let backend = InMemoryBackend::new();
        let mut sessions = IdentityProvider::subscribe(&backend);

        let user = signed_in(&backend, "restore@example.com").await;
        assert_eq!(sessions.recv().await, Some(Some(user.clone())));

        let session = backend.current_session().await.unwrap().unwrap();
        backend.sign_out().await.unwrap();
        assert_eq!(sessions.recv().await, Some(None));

        // A signed-out token is no longer accepted
        assert!(backend.restore_session(session).await.is_err());

        let fresh = backend.sign_in("restore@example.com", "secret-password").await.unwrap();
        backend.restore_session(fresh).await.unwrap();
        assert_eq!(backend.current_user().await.unwrap().map(|u| u.id), Some(user.id));
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let backend = InMemoryBackend::new();
        backend.fail_next_calls(1);
        assert!(backend.current_user().await.is_err());
        assert!(backend.current_user().await.is_ok());

        backend.set_offline(true);
        assert!(matches!(backend.list_by_owner("x").await, Err(Error::Remote(_))));
        backend.set_offline(false);
        assert_eq!(backend.call_count(), 3);
    }
}
