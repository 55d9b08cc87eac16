//! Supabase client
//!
//! Talks to a hosted Supabase project: PostgREST for the `todos` table and
//! GoTrue for accounts and sessions. The client is constructed explicitly by
//! the application context and shared by cloning; there is no global
//! instance.
//!
//! API references:
//! - https://postgrest.org/en/stable/references/api.html
//! - https://github.com/supabase/auth (GoTrue REST endpoints)

mod auth;
mod changes;
mod rest;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::{Session, User};
use crate::ports::Subscribers;

pub use changes::diff_snapshots;

/// Default interval between change-feed polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state behind every clone of the client
struct ClientInner {
    http: Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    session_subscribers: Subscribers<Option<User>>,
    poll_interval: Duration,
}

/// Supabase API client; implements both `TodoStore` and `IdentityProvider`
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<ClientInner>,
}

/// Error body shapes returned by PostgREST and GoTrue
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
    }
}

impl SupabaseClient {
    /// Create a client for a project URL and public (anon) API key
    ///
    /// Neither value is validated here; a missing or malformed URL surfaces
    /// as a remote error on the first request.
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        Self::with_poll_interval(url, anon_key, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(url: &str, anon_key: &str, poll_interval: Duration) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url: url.trim().trim_end_matches('/').to_string(),
                anon_key: anon_key.trim().to_string(),
                session: RwLock::new(None),
                session_subscribers: Subscribers::new(),
                poll_interval,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.inner.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.inner.base_url, path)
    }

    fn stored_session(&self) -> Option<Session> {
        self.inner
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_session(&self, session: Option<Session>) {
        let user = session.as_ref().map(|s| s.user.clone());
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
        self.inner.session_subscribers.publish(auth::SESSION_SCOPE, &user);
    }

    /// Request with the API key and the caller's bearer token
    ///
    /// Signed-in requests carry the user's access token so row-level
    /// security applies; otherwise the anon key doubles as the bearer.
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .stored_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.inner.anon_key.clone());

        debug!(%method, url, "supabase request");
        self.inner
            .http
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }

    fn anon_request(&self, method: Method, url: &str) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(&self.inner.anon_key)
    }

    /// Send a request, refreshing an expired session once on 401
    ///
    /// `build` is called again for the retry so the new access token is
    /// picked up. If another request already refreshed the session, the retry
    /// goes out without a second refresh.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let used_token = self.stored_session().map(|s| s.access_token);
        let response = build().send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(current) = self.stored_session() else {
            return Ok(response);
        };
        if Some(&current.access_token) == used_token.as_ref() {
            let Some(refresh_token) = current.refresh_token else {
                return Ok(response);
            };
            self.refresh_session(&refresh_token).await?;
        }
        Ok(build().send().await?)
    }

    /// Turn a non-success response into a remote error with the backend's message
    async fn check_response(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    status.to_string()
                } else {
                    text.clone()
                }
            });

        Err(Error::remote(format!("{} ({})", message, status.as_u16())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_built_from_trimmed_base() {
        let client = SupabaseClient::new(" https://abc.supabase.co/ ", "anon").unwrap();
        assert_eq!(client.base_url(), "https://abc.supabase.co");
        assert_eq!(client.rest_url("todos"), "https://abc.supabase.co/rest/v1/todos");
        assert_eq!(client.auth_url("user"), "https://abc.supabase.co/auth/v1/user");
    }

    #[test]
    fn test_error_body_message_precedence() {
        let postgrest: ErrorBody =
            serde_json::from_str(r#"{"code":"42501","message":"permission denied"}"#).unwrap();
        assert_eq!(postgrest.into_message().as_deref(), Some("permission denied"));

        let gotrue: ErrorBody = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(gotrue.into_message().as_deref(), Some("Invalid login credentials"));

        let newer: ErrorBody = serde_json::from_str(
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(newer.into_message().as_deref(), Some("Invalid login credentials"));
    }

    #[tokio::test]
    async fn test_missing_configuration_fails_on_first_use() {
        let client = SupabaseClient::new("", "").unwrap();
        let err = crate::ports::TodoStore::list_by_owner(&client, "owner")
            .await
            .unwrap_err();
        assert!(err.is_remote());
    }
}
