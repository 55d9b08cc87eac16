//! GoTrue authentication endpoints

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use super::SupabaseClient;
use crate::domain::messages;
use crate::domain::result::{Error, Result};
use crate::domain::{Session, User};
use crate::ports::{IdentityProvider, Subscription};

pub(super) const SESSION_SCOPE: &str = "session";

/// User object as returned by GoTrue; fields we don't use are ignored
#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Token grant response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

/// Map the identity service's user into the application's `User`
fn map_user(user: AuthUser) -> User {
    User {
        id: user.id,
        email: user.email.unwrap_or_default(),
        created_at: user.created_at.unwrap_or_else(Utc::now),
    }
}

fn map_session(token: TokenResponse) -> Session {
    let expires_at = token
        .expires_at
        .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
    Session {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at,
        user: map_user(token.user),
    }
}

/// A refresh grant may omit the refresh token, in which case the old one stays valid
fn refreshed_session(token: TokenResponse, previous_refresh_token: &str) -> Session {
    let mut session = map_session(token);
    if session.refresh_token.is_none() {
        session.refresh_token = Some(previous_refresh_token.to_string());
    }
    session
}

impl SupabaseClient {
    /// Exchange a refresh token for a new session and store it
    ///
    /// A rejected refresh token ends the local session; other failures leave
    /// it in place so a later request can try again.
    pub(super) async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        // The expired access token is useless here; the anon key authorizes the grant
        let response = self
            .anon_request(Method::POST, &self.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(status = %response.status(), "refresh token rejected");
            self.set_session(None);
            return Err(Error::authentication(messages::SESSION_EXPIRED));
        }

        let token: TokenResponse = Self::check_response(response).await?.json().await?;
        let session = refreshed_session(token, refresh_token);
        self.set_session(Some(session.clone()));
        debug!("session refreshed");
        Ok(session)
    }
}

/// Sign-up answers with a session when email confirmation is off, and with
/// a bare user object when it is on
fn parse_sign_up(body: JsonValue) -> Result<Option<Session>> {
    if body.get("access_token").is_some() {
        let token: TokenResponse = serde_json::from_value(body)?;
        Ok(Some(map_session(token)))
    } else {
        Ok(None)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let response = self
            .request(Method::POST, &self.auth_url("signup"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: JsonValue = Self::check_response(response).await?.json().await?;

        let session = parse_sign_up(body)?;
        if let Some(session) = &session {
            self.set_session(Some(session.clone()));
        }
        info!(confirmed = session.is_some(), "account registered");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .request(Method::POST, &self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let token: TokenResponse = Self::check_response(response).await?.json().await?;

        let session = map_session(token);
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.stored_session().is_none() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, &self.auth_url("logout"))
            .send()
            .await?;
        // An already-revoked token still ends the local session
        if response.status() != StatusCode::UNAUTHORIZED {
            Self::check_response(response).await?;
        }

        self.set_session(None);
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        if self.stored_session().is_none() {
            return Ok(None);
        }

        let response = self
            .send_authorized(|| self.request(Method::GET, &self.auth_url("user")))
            .await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(None);
        }

        let user: AuthUser = Self::check_response(response).await?.json().await?;
        Ok(Some(map_user(user)))
    }

    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.stored_session())
    }

    async fn restore_session(&self, session: Session) -> Result<()> {
        if !session.is_expired(Utc::now()) {
            self.set_session(Some(session));
            return Ok(());
        }
        match &session.refresh_token {
            Some(refresh_token) => self.refresh_session(refresh_token).await.map(|_| ()),
            None => Err(Error::authentication(messages::SESSION_EXPIRED)),
        }
    }

    fn subscribe(&self) -> Subscription<Option<User>> {
        self.inner.session_subscribers.subscribe(SESSION_SCOPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_user_defaults_missing_fields() {
        let user: AuthUser = serde_json::from_value(json!({
            "id": "8d0fd2b3-9ca7-4d9e-a95f-9e13dd3b3db6",
            "aud": "authenticated",
            "role": "authenticated",
            "phone": ""
        }))
        .unwrap();
        let before = Utc::now();
        let mapped = map_user(user);
        assert_eq!(mapped.id, "8d0fd2b3-9ca7-4d9e-a95f-9e13dd3b3db6");
        assert_eq!(mapped.email, "");
        assert!(mapped.created_at >= before);
    }

    #[test]
    fn test_token_response_maps_to_session() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {
                "id": "u1",
                "email": "a@example.com",
                "created_at": "2024-01-02T03:04:05.000000Z"
            }
        }))
        .unwrap();
        let session = map_session(token);
        assert_eq!(session.access_token, "jwt");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh"));
        assert!(session.expires_at.unwrap() > Utc::now().timestamp());
        assert_eq!(session.user.email, "a@example.com");
    }

    #[test]
    fn test_refresh_response_maps_to_session() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt-2",
            "token_type": "bearer",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "refresh_token": "refresh-2",
            "user": { "id": "u1", "email": "a@example.com" }
        }))
        .unwrap();
        let session = refreshed_session(token, "refresh-1");
        assert_eq!(session.access_token, "jwt-2");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(session.expires_at, Some(1_900_000_000));
        assert_eq!(session.user.id, "u1");

        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "jwt-3",
            "expires_in": 3600,
            "user": { "id": "u1" }
        }))
        .unwrap();
        let session = refreshed_session(token, "refresh-2");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
    }

    #[test]
    fn test_sign_up_without_session() {
        let body = json!({ "id": "u1", "email": "a@example.com", "confirmation_sent_at": "x" });
        assert!(parse_sign_up(body).unwrap().is_none());

        let body = json!({
            "access_token": "jwt",
            "user": { "id": "u1", "email": "a@example.com" }
        });
        assert!(parse_sign_up(body).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_and_subscribe_without_network() {
        let client = SupabaseClient::new("https://abc.supabase.co", "anon").unwrap();
        let mut sessions = IdentityProvider::subscribe(&client);

        let session = Session {
            access_token: "jwt".to_string(),
            refresh_token: None,
            expires_at: None,
            user: User::new("u1", "a@example.com"),
        };
        client.restore_session(session.clone()).await.unwrap();
        assert_eq!(client.current_session().await.unwrap(), Some(session.clone()));
        assert_eq!(sessions.recv().await, Some(Some(session.user)));

        let expired = Session {
            expires_at: Some(Utc::now().timestamp() - 10),
            ..client.current_session().await.unwrap().unwrap()
        };
        let err = client.restore_session(expired).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(ref m) if m == messages::SESSION_EXPIRED));
    }
}
