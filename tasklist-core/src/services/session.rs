//! Session tracker - who is signed in, kept current by the identity provider

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::result::Result;
use crate::domain::{Session, User};
use crate::services::AuthService;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Authenticated-user state for one front end
///
/// `start` reads the current user once and then follows session changes
/// until the tracker is dropped. Sign-in, sign-up and sign-out record a
/// user-facing error message on failure and clear it on the next attempt.
pub struct SessionTracker {
    auth: Arc<AuthService>,
    state: Arc<Mutex<SessionState>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionTracker {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            auth,
            state: Arc::new(Mutex::new(SessionState {
                loading: true,
                ..SessionState::default()
            })),
            pump: StdMutex::new(None),
        }
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fetch the current user and start following session changes
    pub async fn start(&self) -> Result<Option<User>> {
        if self.pump_slot().is_none() {
            let mut subscription = self.auth.subscribe();
            let state = Arc::clone(&self.state);
            let handle = tokio::spawn(async move {
                while let Some(user) = subscription.recv().await {
                    debug!(signed_in = user.is_some(), "session changed");
                    state.lock().await.user = user;
                }
            });
            *self.pump_slot() = Some(handle);
        }

        let result = self.auth.current_user().await;
        let mut state = self.state.lock().await;
        state.loading = false;
        match result {
            Ok(user) => {
                state.user = user.clone();
                Ok(user)
            }
            Err(e) => {
                state.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        self.begin().await;
        let result = self.auth.sign_up(email, password).await;
        let signed_in = result.as_ref().ok().and_then(|s| s.as_ref()).map(|s| s.user.clone());
        self.finish(result, signed_in).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.begin().await;
        let result = self.auth.sign_in(email, password).await;
        let signed_in = result.as_ref().ok().map(|s| s.user.clone());
        self.finish(result, signed_in).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.begin().await;
        let result = self.auth.sign_out().await;
        let mut state = self.state.lock().await;
        state.loading = false;
        match &result {
            Ok(()) => state.user = None,
            Err(e) => state.error = Some(e.user_message()),
        }
        result
    }

    async fn begin(&self) {
        let mut state = self.state.lock().await;
        state.loading = true;
        state.error = None;
    }

    async fn finish<T>(&self, result: Result<T>, signed_in: Option<User>) -> Result<T> {
        let mut state = self.state.lock().await;
        state.loading = false;
        match &result {
            Ok(_) => {
                if signed_in.is_some() {
                    state.user = signed_in;
                }
            }
            Err(e) => state.error = Some(e.user_message()),
        }
        result
    }

    pub async fn user(&self) -> Option<User> {
        self.state.lock().await.user.clone()
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.user.is_some()
    }
}

impl Drop for SessionTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_slot().take() {
            handle.abort();
        }
    }
}
