//! Todo sync - the live, per-session view of the signed-in user's todos
//!
//! The list is fed by three sources: a bulk fetch when an owner becomes
//! active, optimistic local edits, and the backend's change notifications.
//! All of them funnel through `SyncState`, a plain state machine guarded by
//! one async mutex, so they are applied in a single order.
//!
//! Ordering between local edits and notifications: while a local operation
//! on a record is in flight, the record is tagged pending and notifications
//! about it are parked; inserts are parked while any create is in flight,
//! because the server id of the new row is not known yet. Parked events are
//! replayed once the local operation settles. Replays are idempotent: an
//! event describing a state the list already holds changes nothing.
//!
//! Every activation bumps a generation number. Completions and
//! notifications stamped with an older generation are dropped, which keeps
//! results for a previous owner out of the current view.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::messages;
use crate::domain::result::{Error, Result};
use crate::domain::{ChangeEvent, Todo, TodoDraft, TodoPatch, TodoStats};
use crate::ports::Subscription;
use crate::services::TodoService;

/// Prefix of identifiers given to optimistic records before the server answers
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// Point-in-time copy of the synchronized state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub owner: Option<String>,
    pub todos: Vec<Todo>,
    pub stats: TodoStats,
    pub loading: bool,
    pub error: Option<String>,
}

/// What happened to a change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Applied to the list
    Applied,
    /// Parked until a local operation on the same record settles
    Deferred,
    /// Not for this owner
    Ignored,
    /// From an earlier activation
    Stale,
}

#[derive(Debug, Default)]
struct SyncState {
    owner: Option<String>,
    generation: u64,
    todos: Vec<Todo>,
    stats: TodoStats,
    /// In-flight local operations per record id
    pending: HashMap<String, usize>,
    pending_creates: usize,
    deferred: VecDeque<ChangeEvent>,
    loading: bool,
    error: Option<String>,
}

impl SyncState {
    /// Switch to a new owner (or none) and start from an empty list
    fn activate(&mut self, owner: Option<String>) -> u64 {
        self.generation += 1;
        self.loading = owner.is_some();
        self.owner = owner;
        self.todos.clear();
        self.stats = TodoStats::default();
        self.pending.clear();
        self.pending_creates = 0;
        self.deferred.clear();
        self.error = None;
        self.generation
    }

    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            owner: self.owner.clone(),
            todos: self.todos.clone(),
            stats: self.stats,
            loading: self.loading,
            error: self.error.clone(),
        }
    }

    fn owner(&self) -> Result<String> {
        self.owner
            .clone()
            .ok_or_else(|| Error::authentication(messages::SIGN_IN_REQUIRED))
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.todos.iter().position(|t| t.id == id)
    }

    fn mark_pending(&mut self, id: &str) {
        *self.pending.entry(id.to_string()).or_insert(0) += 1;
    }

    fn unmark_pending(&mut self, id: &str) {
        if let Some(count) = self.pending.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(id);
            }
        }
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_remote() {
                warn!(error = %e, "todo sync remote failure");
            }
            self.error = Some(e.user_message());
        }
        result
    }

    /// Replace incremental counts with a recount if they disagree with the list
    fn reconcile_stats(&mut self) {
        let recomputed = TodoStats::from_todos(&self.todos);
        if self.stats != recomputed {
            warn!(
                incremental = ?self.stats,
                recomputed = ?recomputed,
                "todo stats drifted from list; using recount"
            );
            self.stats = recomputed;
        }
    }

    // === Bulk fetch ===

    fn begin_fetch(&mut self) -> Option<(u64, String)> {
        let owner = self.owner.clone()?;
        self.loading = true;
        self.error = None;
        Some((self.generation, owner))
    }

    /// Install a fetched list, keeping records with local work in flight
    fn finish_fetch(&mut self, generation: u64, result: Result<Vec<Todo>>) -> Result<()> {
        if generation != self.generation {
            return result.map(|_| ());
        }
        self.loading = false;

        let fetched = self.record(result)?;
        let mut merged: Vec<Todo> = self
            .todos
            .iter()
            .filter(|t| is_local_id(&t.id))
            .cloned()
            .collect();
        for todo in fetched {
            let local = if self.pending.contains_key(&todo.id) {
                self.todos.iter().find(|t| t.id == todo.id).cloned()
            } else {
                None
            };
            merged.push(local.unwrap_or(todo));
        }

        self.todos = merged;
        self.stats = TodoStats::from_todos(&self.todos);
        self.flush_deferred();
        Ok(())
    }

    // === Create ===

    /// Prepend an optimistic record and return its temporary id
    fn begin_create(&mut self, draft: &TodoDraft, owner: &str) -> String {
        let now = Utc::now();
        let temp_id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4());
        let optimistic = Todo {
            id: temp_id.clone(),
            user_id: owner.to_string(),
            title: draft.title().to_string(),
            description: draft.description().to_string(),
            is_completed: false,
            created_at: now,
            updated_at: now,
        };

        self.stats.apply_change(&ChangeEvent::Insert { new: optimistic.clone() });
        self.todos.insert(0, optimistic);
        self.pending_creates += 1;
        self.mark_pending(&temp_id);
        temp_id
    }

    /// Swap the optimistic record for the server's, or drop it on failure
    fn finish_create(&mut self, generation: u64, temp_id: &str, result: Result<Todo>) -> Result<Todo> {
        if generation != self.generation {
            return result;
        }
        self.pending_creates = self.pending_creates.saturating_sub(1);
        self.unmark_pending(temp_id);

        match &result {
            Ok(created) => {
                if let Some(existing) = self.index_of(&created.id) {
                    let old = self.todos.remove(existing);
                    self.stats.apply_change(&ChangeEvent::Delete { old });
                }
                match self.index_of(temp_id) {
                    Some(index) => self.todos[index] = created.clone(),
                    None => self.todos.insert(0, created.clone()),
                }
            }
            Err(_) => {
                if let Some(index) = self.index_of(temp_id) {
                    let removed = self.todos.remove(index);
                    self.stats.apply_change(&ChangeEvent::Delete { old: removed });
                }
            }
        }

        self.reconcile_stats();
        self.flush_deferred();
        self.record(result)
    }

    // === Toggle (optimistic, rolled back on failure) ===

    /// Flip the local flag and return the record as it was
    fn begin_toggle(&mut self, id: &str) -> Result<Todo> {
        let Some(index) = self.index_of(id) else {
            return self.record(Err(Error::not_found(messages::TODO_NOT_FOUND)));
        };
        let before = self.todos[index].clone();
        let mut flipped = before.clone();
        flipped.is_completed = !before.is_completed;

        self.stats.apply_change(&ChangeEvent::Update {
            old: before.clone(),
            new: flipped.clone(),
        });
        self.todos[index] = flipped;
        self.mark_pending(id);
        Ok(before)
    }

    fn finish_toggle(
        &mut self,
        generation: u64,
        id: &str,
        before: Todo,
        result: Result<Todo>,
    ) -> Result<Todo> {
        if generation != self.generation {
            return result;
        }
        self.unmark_pending(id);

        if let Some(index) = self.index_of(id) {
            let current = self.todos[index].clone();
            let replacement = match &result {
                Ok(server) => server.clone(),
                Err(_) => before,
            };
            self.stats.apply_change(&ChangeEvent::Update {
                old: current,
                new: replacement.clone(),
            });
            self.todos[index] = replacement;
        }

        self.reconcile_stats();
        self.flush_deferred();
        self.record(result)
    }

    // === Update (applied after the server confirms) ===

    fn begin_update(&mut self, id: &str) {
        self.error = None;
        self.mark_pending(id);
    }

    fn finish_update(&mut self, generation: u64, id: &str, result: Result<Todo>) -> Result<Todo> {
        if generation != self.generation {
            return result;
        }
        self.unmark_pending(id);

        if let Ok(updated) = &result {
            if let Some(index) = self.index_of(id) {
                let old = std::mem::replace(&mut self.todos[index], updated.clone());
                self.stats.apply_change(&ChangeEvent::Update {
                    old,
                    new: updated.clone(),
                });
            }
        }

        self.reconcile_stats();
        self.flush_deferred();
        self.record(result)
    }

    // === Delete (remote first, then local) ===

    fn begin_delete(&mut self, id: &str) -> Result<()> {
        if self.index_of(id).is_none() {
            return self.record(Err(Error::not_found(messages::TODO_TO_DELETE_NOT_FOUND)));
        }
        self.mark_pending(id);
        Ok(())
    }

    fn finish_delete(&mut self, generation: u64, id: &str, result: Result<()>) -> Result<()> {
        if generation != self.generation {
            return result;
        }
        self.unmark_pending(id);

        if result.is_ok() {
            self.todos.retain(|t| t.id != id);
            self.stats = TodoStats::from_todos(&self.todos);
        }

        self.flush_deferred();
        self.record(result)
    }

    // === Change notifications ===

    fn is_blocked(&self, event: &ChangeEvent) -> bool {
        self.pending.contains_key(event.id())
            || (matches!(event, ChangeEvent::Insert { .. }) && self.pending_creates > 0)
    }

    fn apply_remote(&mut self, generation: u64, event: ChangeEvent) -> RemoteOutcome {
        if generation != self.generation {
            return RemoteOutcome::Stale;
        }
        if self.owner.as_deref() != Some(event.owner()) {
            return RemoteOutcome::Ignored;
        }
        if self.is_blocked(&event) {
            debug!(id = event.id(), kind = event.kind(), "change parked behind local operation");
            self.deferred.push_back(event);
            return RemoteOutcome::Deferred;
        }
        self.patch(&event);
        RemoteOutcome::Applied
    }

    /// Whether `incoming` differs from the local record and is not older than it
    fn is_newer(&self, index: usize, incoming: &Todo) -> bool {
        let local = &self.todos[index];
        local != incoming && incoming.updated_at >= local.updated_at
    }

    /// Patch the single affected record; counts follow the event's pre-image
    fn patch(&mut self, event: &ChangeEvent) {
        match event {
            // An insert never supersedes a local row with the same timestamp
            ChangeEvent::Insert { new } => match self.index_of(&new.id) {
                Some(index) if new.updated_at <= self.todos[index].updated_at => {}
                Some(index) => {
                    let old = std::mem::replace(&mut self.todos[index], new.clone());
                    self.stats.apply_change(&ChangeEvent::Update { old, new: new.clone() });
                }
                None => {
                    self.todos.insert(0, new.clone());
                    self.stats.apply_change(event);
                }
            },
            ChangeEvent::Update { new, .. } => {
                if let Some(index) = self.index_of(&new.id) {
                    if self.is_newer(index, new) {
                        self.todos[index] = new.clone();
                        self.stats.apply_change(event);
                    }
                }
            }
            ChangeEvent::Delete { old } => {
                if let Some(index) = self.index_of(&old.id) {
                    self.todos.remove(index);
                    self.stats.apply_change(event);
                }
            }
        }
        self.reconcile_stats();
    }

    /// Replay parked events that are no longer blocked, in arrival order
    fn flush_deferred(&mut self) {
        let queued: Vec<ChangeEvent> = self.deferred.drain(..).collect();
        for event in queued {
            if self.is_blocked(&event) {
                self.deferred.push_back(event);
            } else {
                self.patch(&event);
            }
        }
    }
}

/// Live todo list for one signed-in owner at a time
///
/// Holds at most one change subscription. `activate` with the current owner
/// is a no-op; with a different owner it releases the old subscription
/// before opening the new one. `deactivate` and dropping the sync release it
/// too.
pub struct TodoSync {
    service: Arc<TodoService>,
    state: Arc<Mutex<SyncState>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
    /// Held for the whole of `activate`/`deactivate` so owner switches never interleave
    activation: Mutex<()>,
}

impl TodoSync {
    pub fn new(service: Arc<TodoService>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(SyncState::default())),
            pump: StdMutex::new(None),
            activation: Mutex::new(()),
        }
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn pump_running(&self) -> bool {
        self.pump_slot()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn stop_pump(&self) {
        if let Some(handle) = self.pump_slot().take() {
            // Aborting drops the subscription held by the task, which closes it
            handle.abort();
        }
    }

    fn start_pump(&self, generation: u64, mut subscription: Subscription<ChangeEvent>) {
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let outcome = state.lock().await.apply_remote(generation, event);
                if outcome == RemoteOutcome::Stale {
                    break;
                }
            }
            subscription.close();
        });
        if let Some(previous) = self.pump_slot().replace(handle) {
            previous.abort();
        }
    }

    /// Make `owner` the active owner: subscribe to its changes and fetch its list
    ///
    /// `None` clears the view (signed out).
    pub async fn activate(&self, owner: Option<&str>) -> Result<()> {
        let _activation = self.activation.lock().await;
        {
            let state = self.state.lock().await;
            if state.owner.as_deref() == owner && (owner.is_none() || self.pump_running()) {
                return Ok(());
            }
        }

        self.stop_pump();
        let generation = self.state.lock().await.activate(owner.map(str::to_string));
        let Some(owner) = owner else {
            return Ok(());
        };

        match self.service.subscribe(owner).await {
            Ok(mut subscription) => {
                if self.state.lock().await.generation != generation {
                    subscription.close();
                    return Ok(());
                }
                self.start_pump(generation, subscription)
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                if state.generation == generation {
                    state.loading = false;
                }
                return state.record(Err(e));
            }
        }

        self.refresh().await
    }

    /// Release the subscription and clear the view
    pub async fn deactivate(&self) {
        let _activation = self.activation.lock().await;
        self.stop_pump();
        self.state.lock().await.activate(None);
    }

    /// Re-read the owner's list from the backend
    pub async fn refresh(&self) -> Result<()> {
        let Some((generation, owner)) = self.state.lock().await.begin_fetch() else {
            return Ok(());
        };
        let result = self.service.list(&owner).await;
        self.state.lock().await.finish_fetch(generation, result)
    }

    /// Create a todo optimistically
    pub async fn create(&self, title: &str, description: &str) -> Result<Todo> {
        let (generation, owner, draft, temp_id) = {
            let mut state = self.state.lock().await;
            state.error = None;
            let owner = match state.owner() {
                Ok(owner) => owner,
                Err(e) => return state.record(Err(e)),
            };
            let draft = match TodoDraft::new(title, description) {
                Ok(draft) => draft,
                Err(e) => return state.record(Err(e)),
            };
            let temp_id = state.begin_create(&draft, &owner);
            (state.generation, owner, draft, temp_id)
        };

        let result = self.service.create_draft(&owner, draft).await;
        self.state.lock().await.finish_create(generation, &temp_id, result)
    }

    /// Update the provided fields once the backend confirms
    pub async fn update(&self, id: &str, patch: &TodoPatch) -> Result<Todo> {
        let generation = {
            let mut state = self.state.lock().await;
            if let Err(e) = state.owner() {
                return state.record(Err(e));
            }
            state.begin_update(id);
            state.generation
        };

        let result = self.service.update(id, patch).await;
        self.state.lock().await.finish_update(generation, id, result)
    }

    /// Flip completion optimistically, restoring the record if the write fails
    pub async fn toggle(&self, id: &str) -> Result<Todo> {
        let (generation, before) = {
            let mut state = self.state.lock().await;
            state.error = None;
            let before = state.begin_toggle(id)?;
            (state.generation, before)
        };

        let result = self.service.toggle_completion(id).await;
        self.state.lock().await.finish_toggle(generation, id, before, result)
    }

    /// Delete remotely, then drop the record locally
    pub async fn delete(&self, id: &str) -> Result<()> {
        let generation = {
            let mut state = self.state.lock().await;
            state.error = None;
            state.begin_delete(id)?;
            state.generation
        };

        let result = self.service.delete(id).await;
        self.state.lock().await.finish_delete(generation, id, result)
    }

    pub async fn snapshot(&self) -> SyncSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn todos(&self) -> Vec<Todo> {
        self.state.lock().await.todos.clone()
    }

    pub async fn stats(&self) -> TodoStats {
        self.state.lock().await.stats
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    pub async fn owner(&self) -> Option<String> {
        self.state.lock().await.owner.clone()
    }

    /// Look up a record in the local list
    pub async fn find(&self, id: &str) -> Option<Todo> {
        let state = self.state.lock().await;
        state.index_of(id).map(|i| state.todos[i].clone())
    }

    pub fn is_subscribed(&self) -> bool {
        self.pump_running()
    }
}

impl Drop for TodoSync {
    fn drop(&mut self) {
        self.stop_pump();
    }
}
