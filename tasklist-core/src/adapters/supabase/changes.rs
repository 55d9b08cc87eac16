//! Change feed for the `todos` table
//!
//! Each subscription runs a background task that re-reads the owner's rows
//! on an interval and turns the difference between two snapshots into
//! insert/update/delete events with pre-images. The task stops as soon as
//! the subscription handle is closed or dropped, or once the client no
//! longer holds a session.

use std::collections::HashMap;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::SupabaseClient;
use crate::domain::{ChangeEvent, Todo};
use crate::ports::{Subscription, TodoStore};

/// Events that turn `previous` into `current`
///
/// Inserts are emitted oldest first so that prepending them in order leaves
/// the newest row at the front. Updates follow in `current` order, then
/// deletes.
pub fn diff_snapshots(previous: &[Todo], current: &[Todo]) -> Vec<ChangeEvent> {
    let before: HashMap<&str, &Todo> = previous.iter().map(|t| (t.id.as_str(), t)).collect();
    let after: HashMap<&str, &Todo> = current.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut events = Vec::new();

    for todo in current.iter().rev() {
        if !before.contains_key(todo.id.as_str()) {
            events.push(ChangeEvent::Insert { new: todo.clone() });
        }
    }

    for todo in current {
        if let Some(old) = before.get(todo.id.as_str()) {
            if *old != todo {
                events.push(ChangeEvent::Update {
                    old: (*old).clone(),
                    new: todo.clone(),
                });
            }
        }
    }

    for todo in previous {
        if !after.contains_key(todo.id.as_str()) {
            events.push(ChangeEvent::Delete { old: todo.clone() });
        }
    }

    events
}

impl SupabaseClient {
    pub(super) fn spawn_change_feed(&self, owner: &str) -> Subscription<ChangeEvent> {
        let (tx, subscription) = Subscription::channel();
        let client = self.clone();
        let owner = owner.to_string();
        let period = self.poll_interval();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous: Option<Vec<Todo>> = None;

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    _ = ticker.tick() => {}
                }

                // Without a session row-level security hides every row, which
                // would read as the owner's whole list being deleted
                if client.stored_session().is_none() {
                    debug!(owner = %owner, "session ended, stopping change feed");
                    break;
                }

                let current = match client.list_by_owner(&owner).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(error = %e, "change feed poll failed");
                        continue;
                    }
                };

                if let Some(previous) = &previous {
                    for event in diff_snapshots(previous, &current) {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                }
                previous = Some(current);
            }
            debug!(owner = %owner, "change feed stopped");
        });

        subscription
    }
}
