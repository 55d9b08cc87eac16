//! Auth service - credential rules over the identity provider

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::info;

use crate::domain::messages;
use crate::domain::result::{Error, Result};
use crate::domain::{Session, User};
use crate::ports::{IdentityProvider, Subscription};

/// local-part "@" domain "." tld, no whitespace
fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

fn require_credentials(email: &str, password: &str) -> Result<()> {
    if email.is_empty() || password.is_empty() {
        return Err(Error::validation(messages::CREDENTIALS_REQUIRED));
    }
    Ok(())
}

/// Check sign-up input
pub fn validate_sign_up(email: &str, password: &str) -> Result<()> {
    require_credentials(email, password)?;
    if !email_pattern().is_match(email) {
        return Err(Error::validation(messages::INVALID_EMAIL));
    }
    if password.chars().count() < messages::MIN_PASSWORD_LEN {
        return Err(Error::validation(messages::PASSWORD_TOO_SHORT));
    }
    Ok(())
}

/// Check the registration form, which also asks for the password twice
pub fn validate_registration(email: &str, password: &str, confirmation: &str) -> Result<()> {
    require_credentials(email, password)?;
    if password != confirmation {
        return Err(Error::validation(messages::PASSWORDS_DO_NOT_MATCH));
    }
    validate_sign_up(email, password)
}

/// Validation and error mapping layered over an `IdentityProvider`
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
}

impl AuthService {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self { identity }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        validate_sign_up(email, password)?;
        let session = self.identity.sign_up(email, password).await?;
        info!(backend = self.identity.name(), "sign-up completed");
        Ok(session)
    }

    /// Sign in; bad credentials come back as a fixed authentication message
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        require_credentials(email, password)?;
        match self.identity.sign_in(email, password).await {
            Ok(session) => Ok(session),
            Err(e) if e.to_string().contains(messages::BACKEND_INVALID_CREDENTIALS) => {
                Err(Error::authentication(messages::INVALID_CREDENTIALS))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.identity.sign_out().await
    }

    pub async fn current_user(&self) -> Result<Option<User>> {
        self.identity.current_user().await
    }

    pub async fn current_session(&self) -> Result<Option<Session>> {
        self.identity.current_session().await
    }

    pub async fn restore_session(&self, session: Session) -> Result<()> {
        self.identity.restore_session(session).await
    }

    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.current_user().await?.is_some())
    }

    pub fn subscribe(&self) -> Subscription<Option<User>> {
        self.identity.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBackend;

    fn service() -> (Arc<InMemoryBackend>, AuthService) {
        let backend = Arc::new(InMemoryBackend::new());
        (backend.clone(), AuthService::new(backend))
    }

    #[test]
    fn test_sign_up_validation() {
        assert!(validate_sign_up("person@example.com", "secret").is_ok());

        let cases = [
            ("", "secret", messages::CREDENTIALS_REQUIRED),
            ("person@example.com", "", messages::CREDENTIALS_REQUIRED),
            ("not-an-email", "secret", messages::INVALID_EMAIL),
            ("person@example", "secret", messages::INVALID_EMAIL),
            ("per son@example.com", "secret", messages::INVALID_EMAIL),
            ("person@example.com", "12345", messages::PASSWORD_TOO_SHORT),
        ];
        for (email, password, expected) in cases {
            match validate_sign_up(email, password) {
                Err(Error::Validation(msg)) => assert_eq!(msg, expected, "{email}/{password}"),
                other => panic!("expected validation error for {email}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_registration_requires_matching_confirmation() {
        assert!(validate_registration("a@b.co", "secret", "secret").is_ok());
        let err = validate_registration("a@b.co", "secret", "secrets").unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == messages::PASSWORDS_DO_NOT_MATCH));
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_remote_call() {
        let (backend, auth) = service();
        assert!(auth.sign_up("bad", "secret").await.is_err());
        assert!(auth.sign_in("", "").await.is_err());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_password_is_remapped() {
        let (_backend, auth) = service();
        auth.sign_up("user@example.com", "correct-horse").await.unwrap();
        auth.sign_out().await.unwrap();

        let err = auth.sign_in("user@example.com", "wrong-horse").await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(err.user_message(), messages::INVALID_CREDENTIALS);
        assert!(!auth.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_other_sign_in_failures_pass_through() {
        let (backend, auth) = service();
        backend.set_offline(true);
        let err = auth.sign_in("user@example.com", "whatever").await.unwrap_err();
        assert!(err.is_remote());
    }

    #[tokio::test]
    async fn test_sign_up_sign_in_sign_out() {
        let (_backend, auth) = service();
        let session = auth.sign_up("flow@example.com", "password").await.unwrap().unwrap();
        assert!(auth.is_authenticated().await.unwrap());
        assert_eq!(
            auth.current_session().await.unwrap().map(|s| s.user.id),
            Some(session.user.id.clone())
        );

        auth.sign_out().await.unwrap();
        assert!(auth.current_user().await.unwrap().is_none());

        let again = auth.sign_in("flow@example.com", "password").await.unwrap();
        assert_eq!(again.user.id, session.user.id);
    }
}
