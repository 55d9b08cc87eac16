//! Scoped subscription handles
//!
//! A `Subscription` is the receiving end of a change channel. It is released
//! either explicitly with `close()` or implicitly when dropped; producers see
//! the closed channel and stop sending. `Subscribers` is the producer-side
//! registry adapters use to fan events out to every open handle in a scope.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Receiving end of a push channel
#[derive(Debug)]
pub struct Subscription<T> {
    rx: UnboundedReceiver<T>,
    closed: bool,
}

impl<T> Subscription<T> {
    /// Create a connected sender/handle pair
    pub fn channel() -> (UnboundedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx, closed: false })
    }

    /// Wait for the next event; `None` once closed or the producer is gone
    pub async fn recv(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Release the subscription; idempotent
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rx.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Producer-side registry of open subscriptions, keyed by scope
///
/// Scopes are opaque strings (an owner id for row changes, a fixed key for
/// session changes). Closed handles are pruned on every publish.
#[derive(Debug)]
pub struct Subscribers<T> {
    entries: Mutex<Vec<(String, UnboundedSender<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new handle for `scope`
    pub fn subscribe(&self, scope: &str) -> Subscription<T> {
        let (tx, subscription) = Subscription::channel();
        self.lock().push((scope.to_string(), tx));
        subscription
    }

    /// Send `value` to every open handle in `scope`
    pub fn publish(&self, scope: &str, value: &T) {
        self.lock().retain(|(entry_scope, tx)| {
            if tx.is_closed() {
                return false;
            }
            if entry_scope == scope {
                return tx.send(value.clone()).is_ok();
            }
            true
        });
    }

    /// Number of open handles in `scope`
    pub fn active(&self, scope: &str) -> usize {
        let mut entries = self.lock();
        entries.retain(|(_, tx)| !tx.is_closed());
        entries.iter().filter(|(s, _)| s == scope).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, UnboundedSender<T>)>> {
        // The registry holds no invariants a panic could break
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_matching_scope_only() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let mut alice = subscribers.subscribe("alice");
        let mut bob = subscribers.subscribe("bob");

        subscribers.publish("alice", &7);

        assert_eq!(alice.recv().await, Some(7));
        assert_eq!(bob.try_recv(), None);
    }

    #[tokio::test]
    async fn test_closed_handles_are_pruned() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let mut first = subscribers.subscribe("alice");
        let second = subscribers.subscribe("alice");
        assert_eq!(subscribers.active("alice"), 2);

        first.close();
        assert!(first.is_closed());
        assert_eq!(first.recv().await, None);
        drop(second);

        subscribers.publish("alice", &1);
        assert_eq!(subscribers.active("alice"), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (tx, mut subscription) = Subscription::<u8>::channel();
        subscription.close();
        subscription.close();
        assert!(tx.is_closed());
    }
}
