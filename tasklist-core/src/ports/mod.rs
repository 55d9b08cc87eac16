//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod identity;
mod subscription;
mod todo_store;

pub use identity::IdentityProvider;
pub use subscription::{Subscribers, Subscription};
pub use todo_store::TodoStore;
