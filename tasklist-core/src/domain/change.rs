//! Row change notifications and derived list statistics

use serde::{Deserialize, Serialize};

use super::todo::Todo;

/// A change to one row of the owner's todos, as pushed by the backend
///
/// Updates and deletes carry the pre-image (`old`), which is what count
/// adjustments are based on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ChangeEvent {
    Insert { new: Todo },
    Update { old: Todo, new: Todo },
    Delete { old: Todo },
}

impl ChangeEvent {
    /// Identifier of the affected row
    pub fn id(&self) -> &str {
        match self {
            Self::Insert { new } | Self::Update { new, .. } => &new.id,
            Self::Delete { old } => &old.id,
        }
    }

    /// Owner of the affected row
    pub fn owner(&self) -> &str {
        match self {
            Self::Insert { new } | Self::Update { new, .. } => &new.user_id,
            Self::Delete { old } => &old.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "INSERT",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
        }
    }
}

/// Aggregate counts over a todo list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoStats {
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
}

impl TodoStats {
    pub fn new(total: usize, completed: usize) -> Self {
        Self {
            total,
            completed,
            remaining: total.saturating_sub(completed),
        }
    }

    /// Recompute from the authoritative list
    pub fn from_todos(todos: &[Todo]) -> Self {
        let completed = todos.iter().filter(|t| t.is_completed).count();
        Self::new(todos.len(), completed)
    }

    /// Adjust counts for a change, using the pre-image to decide the sign
    /// of the completion delta on update and delete
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Insert { new } => {
                self.total += 1;
                if new.is_completed {
                    self.completed += 1;
                }
            }
            ChangeEvent::Update { old, new } => {
                match (old.is_completed, new.is_completed) {
                    (false, true) => self.completed += 1,
                    (true, false) => self.completed = self.completed.saturating_sub(1),
                    _ => {}
                }
            }
            ChangeEvent::Delete { old } => {
                self.total = self.total.saturating_sub(1);
                if old.is_completed {
                    self.completed = self.completed.saturating_sub(1);
                }
            }
        }
        self.remaining = self.total.saturating_sub(self.completed);
    }

    /// `total == completed + remaining`
    pub fn is_balanced(&self) -> bool {
        self.total == self.completed + self.remaining
    }
}
