//! End-to-end scenarios for the live todo view
//!
//! Every test runs the real services and `TodoSync` against the in-memory
//! backend, which delivers change notifications the same way the hosted
//! service does.
//!
//! Run with: cargo test --test sync_scenarios -- --nocapture

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tasklist_core::adapters::memory::InMemoryBackend;
use tasklist_core::config::Config;
use tasklist_core::domain::messages;
use tasklist_core::domain::TodoDraft;
use tasklist_core::ports::{IdentityProvider, TodoStore};
use tasklist_core::services::TodoSync;
use tasklist_core::{Error, TaskListContext, TodoPatch, TodoStats};

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    _dir: TempDir,
    backend: Arc<InMemoryBackend>,
    ctx: TaskListContext,
}

fn harness() -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let backend = Arc::new(InMemoryBackend::new());
    let ctx = TaskListContext::with_backends(
        dir.path(),
        Config::default(),
        backend.clone(),
        backend.clone(),
    );
    Harness { _dir: dir, backend, ctx }
}

/// Sign up a fresh account and return its user id
async fn signed_in(h: &Harness, email: &str) -> String {
    h.ctx
        .auth_service
        .sign_up(email, "password123")
        .await
        .expect("sign up")
        .expect("session")
        .user
        .id
}

/// Give the notification pump a chance to drain
async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

async fn assert_consistent(sync: &TodoSync) {
    let snapshot = sync.snapshot().await;
    assert_eq!(snapshot.stats.total, snapshot.todos.len());
    assert!(snapshot.stats.is_balanced());
    assert_eq!(snapshot.stats, TodoStats::from_todos(&snapshot.todos));
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_buy_milk_lifecycle() {
    let h = harness();
    let owner = signed_in(&h, "milk@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    assert_eq!(sync.stats().await, TodoStats::new(0, 0));

    let todo = sync.create("Buy milk", "").await.unwrap();
    let todos = sync.todos().await;
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, todo.id);
    assert_eq!(sync.stats().await, TodoStats { total: 1, completed: 0, remaining: 1 });

    sync.toggle(&todo.id).await.unwrap();
    assert_eq!(sync.stats().await, TodoStats { total: 1, completed: 1, remaining: 0 });

    sync.delete(&todo.id).await.unwrap();
    assert!(sync.todos().await.is_empty());
    assert_eq!(sync.stats().await, TodoStats { total: 0, completed: 0, remaining: 0 });

    settle().await;
    assert!(sync.todos().await.is_empty(), "late notifications must not resurrect the row");
    assert_consistent(&sync).await;
}

#[tokio::test]
async fn test_wrong_password_leaves_session_absent() {
    let h = harness();
    signed_in(&h, "pw@example.com").await;
    h.ctx.auth_service.sign_out().await.unwrap();

    let tracker = h.ctx.session_tracker();
    tracker.start().await.unwrap();
    let err = tracker.sign_in("pw@example.com", "wrong-password").await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(tracker.error().await.as_deref(), Some(messages::INVALID_CREDENTIALS));
    assert!(tracker.user().await.is_none());
    assert!(h.ctx.auth_service.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_of_missing_id_leaves_list_unchanged() {
    let h = harness();
    let owner = signed_in(&h, "missing@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    sync.create("Keep me", "").await.unwrap();
    let before = sync.todos().await;

    let err = sync
        .update("does-not-exist", &TodoPatch::default().title("x"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(sync.todos().await, before);
    assert_eq!(sync.error().await.as_deref(), Some(messages::TODO_TO_UPDATE_NOT_FOUND));
}

#[tokio::test]
async fn test_update_applies_after_confirmation() {
    let h = harness();
    let owner = signed_in(&h, "edit@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    let todo = sync.create("Draft", "old").await.unwrap();

    let updated = sync
        .update(&todo.id, &TodoPatch::default().title(" Final ").description(""))
        .await
        .unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(sync.find(&todo.id).await, Some(updated));
}

#[tokio::test]
async fn test_failed_toggle_rolls_back() {
    let h = harness();
    let owner = signed_in(&h, "rollback@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    let todo = sync.create("Fragile", "").await.unwrap();

    h.backend.fail_next_calls(1);
    let err = sync.toggle(&todo.id).await.unwrap_err();

    assert!(err.is_remote());
    assert!(!sync.find(&todo.id).await.unwrap().is_completed);
    assert_eq!(sync.stats().await, TodoStats::new(1, 0));
    assert_eq!(sync.error().await.as_deref(), Some(messages::UNEXPECTED_ERROR));
}

#[tokio::test]
async fn test_failed_create_removes_optimistic_row() {
    let h = harness();
    let owner = signed_in(&h, "offline@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();

    h.backend.set_offline(true);
    assert!(sync.create("Never saved", "").await.is_err());
    h.backend.set_offline(false);

    assert!(sync.todos().await.is_empty());
    assert_eq!(sync.stats().await, TodoStats::default());
}

#[tokio::test]
async fn test_blank_title_is_rejected_before_any_call() {
    let h = harness();
    let owner = signed_in(&h, "blank@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    let calls = h.backend.call_count();

    let err = sync.create("   ", "desc").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.backend.call_count(), calls);
    assert_eq!(sync.error().await.as_deref(), Some(messages::TITLE_REQUIRED));
    assert!(sync.todos().await.is_empty());
}

#[tokio::test]
async fn test_own_insert_notification_is_not_duplicated() {
    let h = harness();
    let owner = signed_in(&h, "dedup@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();

    for title in ["one", "two", "three"] {
        sync.create(title, "").await.unwrap();
    }
    settle().await;

    let titles: Vec<String> = sync.todos().await.into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["three", "two", "one"]);
    assert_consistent(&sync).await;
}

#[tokio::test]
async fn test_changes_from_elsewhere_are_patched_in() {
    let h = harness();
    let owner = signed_in(&h, "remote@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    let mine = sync.create("Mine", "").await.unwrap();

    // Another device inserts a row and completes ours
    let other = TodoDraft::new("From phone", "").unwrap().into_new_todo(&owner);
    let seeded = h.backend.seed_todo(other);
    h.backend
        .apply_external_update(&mine.id, &TodoPatch::default().completed(true))
        .unwrap();
    settle().await;

    let todos = sync.todos().await;
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0].id, seeded.id);
    assert!(sync.find(&mine.id).await.unwrap().is_completed);
    assert_eq!(sync.stats().await, TodoStats::new(2, 1));
}

#[tokio::test]
async fn test_exactly_one_subscription_per_owner() {
    let h = harness();
    let owner = signed_in(&h, "single@example.com").await;
    let sync = h.ctx.todo_sync();

    sync.activate(Some(&owner)).await.unwrap();
    sync.activate(Some(&owner)).await.unwrap();
    sync.activate(Some(&owner)).await.unwrap();
    settle().await;
    assert_eq!(h.backend.active_subscriptions(&owner), 1);

    sync.activate(Some("someone-else")).await.unwrap();
    settle().await;
    assert_eq!(h.backend.active_subscriptions(&owner), 0);
    assert_eq!(h.backend.active_subscriptions("someone-else"), 1);

    sync.deactivate().await;
    settle().await;
    assert_eq!(h.backend.active_subscriptions("someone-else"), 0);
    assert!(!sync.is_subscribed());
}

#[tokio::test]
async fn test_concurrent_activations_keep_one_subscription() {
    let h = harness();
    let owner = signed_in(&h, "twice@example.com").await;
    let sync = h.ctx.todo_sync();

    let (first, second) = tokio::join!(sync.activate(Some(&owner)), sync.activate(Some(&owner)));
    first.unwrap();
    second.unwrap();
    settle().await;
    assert_eq!(h.backend.active_subscriptions(&owner), 1);

    let other = signed_in(&h, "other@example.com").await;
    let (first, second) = tokio::join!(sync.activate(Some(&other)), sync.activate(Some(&owner)));
    first.unwrap();
    second.unwrap();
    settle().await;
    assert_eq!(
        h.backend.active_subscriptions(&owner) + h.backend.active_subscriptions(&other),
        1
    );
    assert_consistent(&sync).await;
}

#[tokio::test]
async fn test_dropping_the_view_releases_its_subscription() {
    let h = harness();
    let owner = signed_in(&h, "drop@example.com").await;
    {
        let sync = h.ctx.todo_sync();
        sync.activate(Some(&owner)).await.unwrap();
        settle().await;
        assert_eq!(h.backend.active_subscriptions(&owner), 1);
    }
    settle().await;
    assert_eq!(h.backend.active_subscriptions(&owner), 0);
}

#[tokio::test]
async fn test_sign_out_clears_the_view() {
    let h = harness();
    let owner = signed_in(&h, "bye@example.com").await;
    let sync = h.ctx.todo_sync();
    sync.activate(Some(&owner)).await.unwrap();
    sync.create("Private", "").await.unwrap();

    h.ctx.auth_service.sign_out().await.unwrap();
    sync.activate(None).await.unwrap();

    let snapshot = sync.snapshot().await;
    assert!(snapshot.owner.is_none());
    assert!(snapshot.todos.is_empty());
    assert_eq!(snapshot.stats, TodoStats::default());
}

#[tokio::test]
async fn test_completion_write_is_conditional_on_the_read_flag() {
    let h = harness();
    let owner = signed_in(&h, "race@example.com").await;
    let todo = h.ctx.todo_service.create(&owner, "Contested", "").await.unwrap();

    // The conditional write only matches the flag that was read
    let won = h.backend.set_completion_if(&todo.id, true, false).await.unwrap();
    assert!(won.is_none(), "expected no row to match a stale flag");

    h.ctx.todo_service.toggle_completion(&todo.id).await.unwrap();
    let current = h.ctx.todo_service.get(&todo.id).await.unwrap().unwrap();
    assert!(current.is_completed);
}

#[tokio::test]
async fn test_rows_of_other_users_are_invisible() {
    let h = harness();
    let alice = signed_in(&h, "alice@example.com").await;
    h.ctx.todo_service.create(&alice, "Alice's", "").await.unwrap();
    h.ctx.auth_service.sign_out().await.unwrap();

    let bob = signed_in(&h, "bob@example.com").await;
    assert!(h.ctx.todo_service.list(&alice).await.unwrap().is_empty());
    assert!(h.ctx.todo_service.list(&bob).await.unwrap().is_empty());

    let err = h.ctx.todo_service.create(&alice, "Sneaky", "").await.unwrap_err();
    assert!(err.is_remote());
}

#[tokio::test]
async fn test_demo_backend_is_browsable() {
    let backend = InMemoryBackend::new();
    let session = tasklist_core::adapters::demo::seed_demo_backend(&backend)
        .await
        .unwrap();
    assert_eq!(
        backend.current_user().await.unwrap().map(|u| u.id),
        Some(session.user.id)
    );
}
