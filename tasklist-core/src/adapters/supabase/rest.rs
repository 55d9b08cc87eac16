//! PostgREST access to the `todos` table

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::Method;
use serde_json::json;

use super::SupabaseClient;
use crate::domain::result::{Error, Result};
use crate::domain::{ChangeEvent, NewTodo, Todo, TodoPatch};
use crate::ports::{Subscription, TodoStore};

const TABLE: &str = "todos";

/// Parse the total out of a `Content-Range` header (`0-9/42` or `*/42`)
fn parse_content_range_total(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// The exact row count PostgREST reports for `Prefer: count=exact`
fn exact_count(headers: &HeaderMap) -> Result<usize> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range_total)
        .ok_or_else(|| Error::remote("missing exact count"))
}

impl SupabaseClient {
    /// Rows returned by a request that asked for `return=representation`
    async fn fetch_rows<F>(&self, build: F) -> Result<Vec<Todo>>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let response = self.send_authorized(build).await?;
        let response = Self::check_response(response).await?;
        let rows: Vec<Todo> = response.json().await?;
        Ok(rows)
    }
}

#[async_trait]
impl TodoStore for SupabaseClient {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Todo>> {
        let request = || {
            self.request(Method::GET, &self.rest_url(TABLE)).query(&[
                ("select", "*".to_string()),
                ("user_id", format!("eq.{owner}")),
                ("order", "created_at.desc".to_string()),
            ])
        };
        self.fetch_rows(request).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Todo>> {
        let request = || {
            self.request(Method::GET, &self.rest_url(TABLE))
                .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
        };
        Ok(self.fetch_rows(request).await?.into_iter().next())
    }

    async fn create(&self, todo: &NewTodo) -> Result<Todo> {
        let request = || {
            self.request(Method::POST, &self.rest_url(TABLE))
                .header("Prefer", "return=representation")
                .query(&[("select", "*")])
                .json(&[todo])
        };
        self.fetch_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::remote("insert returned no row"))
    }

    async fn update_by_id(&self, id: &str, patch: &TodoPatch) -> Result<Option<Todo>> {
        let request = || {
            self.request(Method::PATCH, &self.rest_url(TABLE))
                .header("Prefer", "return=representation")
                .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))])
                .json(patch)
        };
        Ok(self.fetch_rows(request).await?.into_iter().next())
    }

    async fn set_completion_if(
        &self,
        id: &str,
        expected: bool,
        value: bool,
    ) -> Result<Option<Todo>> {
        let request = || {
            self.request(Method::PATCH, &self.rest_url(TABLE))
                .header("Prefer", "return=representation")
                .query(&[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{id}")),
                    ("is_completed", format!("is.{expected}")),
                ])
                .json(&json!({ "is_completed": value }))
        };
        Ok(self.fetch_rows(request).await?.into_iter().next())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let response = self
            .send_authorized(|| {
                self.request(Method::DELETE, &self.rest_url(TABLE))
                    .query(&[("id", format!("eq.{id}"))])
            })
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    async fn count_by_owner(&self, owner: &str) -> Result<usize> {
        let response = self
            .send_authorized(|| {
                self.request(Method::HEAD, &self.rest_url(TABLE))
                    .header("Prefer", "count=exact")
                    .query(&[("select", "id".to_string()), ("user_id", format!("eq.{owner}"))])
            })
            .await?;
        let response = Self::check_response(response).await?;
        exact_count(response.headers())
    }

    async fn subscribe(&self, owner: &str) -> Result<Subscription<ChangeEvent>> {
        Ok(self.spawn_change_feed(owner))
    }
}
