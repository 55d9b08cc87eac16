//! Identity provider port - sign-up, sign-in and session lifecycle

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::{Session, User};

use super::Subscription;

/// Remote identity service abstraction
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Backend name (e.g., "supabase", "memory")
    fn name(&self) -> &str;

    /// Register a new account
    ///
    /// Returns the session when the service signs the new user in right away,
    /// `None` when it requires email confirmation first.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    /// Exchange credentials for a session
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// End the current session
    async fn sign_out(&self) -> Result<()>;

    /// The signed-in user, if any
    async fn current_user(&self) -> Result<Option<User>>;

    /// The current session, if any
    async fn current_session(&self) -> Result<Option<Session>>;

    /// Adopt a previously issued session (e.g., loaded from disk)
    async fn restore_session(&self, session: Session) -> Result<()>;

    /// Push channel emitting the signed-in user (or `None`) on every change
    fn subscribe(&self) -> Subscription<Option<User>>;
}
