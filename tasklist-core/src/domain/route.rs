//! Navigation model for the front ends
//!
//! Routes mirror the client-facing paths. The list and edit pages require a
//! signed-in user; `guard` sends anyone else to the login page.

use std::fmt;
use std::str::FromStr;

use super::result::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    Register,
    TodoList,
    TodoEdit(String),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
            Self::TodoList => "/todo".to_string(),
            Self::TodoEdit(id) => format!("/todo/{id}/edit"),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::TodoList | Self::TodoEdit(_))
    }

    /// Where a navigation attempt actually lands
    pub fn guard(self, authenticated: bool) -> Self {
        if self.requires_auth() && !authenticated {
            Self::Login
        } else {
            self
        }
    }

    pub fn after_sign_in() -> Self {
        Self::TodoList
    }

    pub fn after_sign_out() -> Self {
        Self::Login
    }

    /// Route shown after saving or cancelling an edit
    pub fn after_edit() -> Self {
        Self::TodoList
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for Route {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let trimmed = path.trim();
        let segments: Vec<&str> = trimmed
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Ok(Self::Home),
            ["login"] => Ok(Self::Login),
            ["register"] => Ok(Self::Register),
            ["todo"] => Ok(Self::TodoList),
            ["todo", id, "edit"] => Ok(Self::TodoEdit((*id).to_string())),
            _ => Err(Error::not_found(format!("No page at {trimmed}"))),
        }
    }
}
