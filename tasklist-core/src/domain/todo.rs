//! Todo domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::messages;
use super::result::{Error, Result};

/// A todo item owned by exactly one user
///
/// Field names match the `todos` table columns so rows deserialize directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The description column is nullable; an absent value reads as empty text
fn deserialize_nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

impl Todo {
    /// Build a todo from an insert payload, stamping both timestamps
    pub fn from_new(id: impl Into<String>, new: NewTodo, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            user_id: new.user_id,
            title: new.title,
            description: new.description,
            is_completed: new.is_completed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a normalized patch in place
    pub fn apply_patch(&mut self, patch: &TodoPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(is_completed) = patch.is_completed {
            self.is_completed = is_completed;
        }
        self.updated_at = now;
    }
}

/// Validated input for creating a todo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    title: String,
    description: String,
}

impl TodoDraft {
    /// Trim both fields and reject a blank title
    pub fn new(title: &str, description: &str) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation(messages::TITLE_REQUIRED));
        }
        Ok(Self {
            title: title.to_string(),
            description: description.trim().to_string(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Insert payload for the given owner
    pub fn into_new_todo(self, user_id: impl Into<String>) -> NewTodo {
        NewTodo {
            user_id: user_id.into(),
            title: self.title,
            description: self.description,
            is_completed: false,
        }
    }
}

/// Row sent to the store on create; identifiers and timestamps are server-assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
}

/// Partial update; only fields that are `Some` are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

impl TodoPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn completed(mut self, is_completed: bool) -> Self {
        self.is_completed = Some(is_completed);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.is_completed.is_none()
    }

    /// Trim textual fields and check the title rule
    pub fn normalized(&self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::validation(messages::NOTHING_TO_UPDATE));
        }
        let title = match &self.title {
            Some(title) if title.trim().is_empty() => {
                return Err(Error::validation(messages::TITLE_REQUIRED));
            }
            Some(title) => Some(title.trim().to_string()),
            None => None,
        };
        Ok(Self {
            title,
            description: self.description.as_ref().map(|d| d.trim().to_string()),
            is_completed: self.is_completed,
        })
    }
}
