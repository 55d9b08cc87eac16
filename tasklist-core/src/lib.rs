//! TaskList Core - business logic for a per-user todo list backed by Supabase
//!
//! This crate follows a hexagonal layout:
//!
//! - **domain**: Core entities (Todo, User, Session, ChangeEvent, Route)
//! - **ports**: Trait definitions for the backend (TodoStore, IdentityProvider)
//! - **services**: Business rules and live state (TodoService, TodoSync, ...)
//! - **adapters**: Concrete implementations (Supabase over HTTP, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use adapters::demo::seed_demo_backend;
use adapters::memory::InMemoryBackend;
use adapters::supabase::SupabaseClient;
use config::Config;
use ports::{IdentityProvider, TodoStore};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{ChangeEvent, Route, Session, Todo, TodoPatch, TodoStats, User};

/// Main context for TaskList operations
///
/// Built once per process and passed to whoever needs it. Holds the
/// configuration, the backend behind both ports, and the services over it.
pub struct TaskListContext {
    pub config: Config,
    pub store: Arc<dyn TodoStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub todo_service: Arc<TodoService>,
    pub auth_service: Arc<AuthService>,
    pub demo_service: DemoService,
    dir: PathBuf,
}

impl TaskListContext {
    /// Create a context for the data directory
    ///
    /// In demo mode the backend is a freshly seeded in-memory store with the
    /// demo account signed in; otherwise it is the configured Supabase
    /// project.
    pub async fn new(dir: &Path) -> Result<Self> {
        let config = Config::load(dir)?;

        if config.demo_mode {
            let backend = Arc::new(InMemoryBackend::new());
            seed_demo_backend(&backend).await?;
            info!("demo mode: using seeded in-memory backend");
            return Ok(Self::with_backends(dir, config, backend.clone(), backend));
        }

        let (url, anon_key) = config.supabase_endpoint();
        let client = SupabaseClient::with_poll_interval(&url, &anon_key, config.poll_interval)?;
        Ok(Self::with_backends(dir, config, Arc::new(client.clone()), Arc::new(client)))
    }

    /// Assemble a context around explicit backends
    pub fn with_backends(
        dir: &Path,
        config: Config,
        store: Arc<dyn TodoStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let todo_service = Arc::new(TodoService::new(Arc::clone(&store)));
        let auth_service = Arc::new(AuthService::new(Arc::clone(&identity)));
        let demo_service = DemoService::new(dir);

        Self {
            config,
            store,
            identity,
            todo_service,
            auth_service,
            demo_service,
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the backend in use ("supabase" or "memory")
    pub fn backend_name(&self) -> &str {
        self.store.name()
    }

    /// A new live todo view over this context's backend
    pub fn todo_sync(&self) -> TodoSync {
        TodoSync::new(Arc::clone(&self.todo_service))
    }

    /// A new authenticated-user tracker over this context's backend
    pub fn session_tracker(&self) -> SessionTracker {
        SessionTracker::new(Arc::clone(&self.auth_service))
    }

    /// Reinstate the session saved by an earlier run
    ///
    /// A session the backend no longer accepts is discarded. Demo mode signs
    /// in on its own and ignores the saved file.
    pub async fn resume_session(&self) -> Result<Option<User>> {
        if !self.config.demo_mode {
            if let Some(saved) = config::load_session(&self.dir)? {
                match self.auth_service.restore_session(saved.clone()).await {
                    // A refreshed session carries a new refresh token; the old one is spent
                    Ok(()) => {
                        if self.auth_service.current_session().await?.as_ref() != Some(&saved) {
                            self.persist_session().await?;
                        }
                    }
                    Err(Error::Authentication(message)) => {
                        warn!(%message, "saved session rejected; signing out");
                        config::save_session(&self.dir, None)?;
                    }
                    Err(e) => warn!(error = %e, "could not restore saved session; keeping it"),
                }
            }
        }
        Ok(self.auth_service.current_user().await?)
    }

    /// Save the backend's current session for the next run
    pub async fn persist_session(&self) -> Result<()> {
        if self.config.demo_mode {
            return Ok(());
        }
        let session = self.auth_service.current_session().await?;
        config::save_session(&self.dir, session.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn memory_context(dir: &Path) -> (Arc<InMemoryBackend>, TaskListContext) {
        let backend = Arc::new(InMemoryBackend::new());
        let ctx = TaskListContext::with_backends(dir, Config::default(), backend.clone(), backend.clone());
        (backend, ctx)
    }

    #[tokio::test]
    async fn test_persist_and_resume_session() {
        let dir = tempdir().unwrap();
        let (backend, ctx) = memory_context(dir.path());
        ctx.auth_service.sign_up("ctx@example.com", "password").await.unwrap();
        ctx.persist_session().await.unwrap();
        assert!(dir.path().join("session.json").exists());

        // Same backend, new process-level state
        backend.forget_current_session();
        let user = ctx.resume_session().await.unwrap();
        assert_eq!(user.map(|u| u.email), Some("ctx@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_session_is_discarded() {
        let dir = tempdir().unwrap();
        let (_backend, ctx) = memory_context(dir.path());
        let session = Session {
            access_token: "forged".to_string(),
            refresh_token: None,
            expires_at: None,
            user: User::new("nobody", "nobody@example.com"),
        };
        config::save_session(dir.path(), Some(&session)).unwrap();

        assert!(ctx.resume_session().await.unwrap().is_none());
        assert!(!dir.path().join("session.json").exists());
    }

    #[tokio::test]
    async fn test_saved_session_survives_an_unreachable_backend() {
        let dir = tempdir().unwrap();
        let (backend, ctx) = memory_context(dir.path());
        ctx.auth_service.sign_up("offline@example.com", "password").await.unwrap();
        ctx.persist_session().await.unwrap();
        backend.forget_current_session();

        backend.set_offline(true);
        assert!(ctx.resume_session().await.is_err());
        assert!(dir.path().join("session.json").exists());

        backend.set_offline(false);
        let user = ctx.resume_session().await.unwrap();
        assert_eq!(user.map(|u| u.email), Some("offline@example.com".to_string()));
    }

    #[tokio::test]
    async fn test_backend_name() {
        let dir = tempdir().unwrap();
        let (_backend, ctx) = memory_context(dir.path());
        assert_eq!(ctx.backend_name(), "memory");
    }
}
