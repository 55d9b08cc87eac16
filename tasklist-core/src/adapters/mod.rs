//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - Supabase (PostgREST + GoTrue over HTTP) for TodoStore and IdentityProvider
//! - In-memory backend for demo mode and tests
//! - Demo data seeding for the in-memory backend

pub mod demo;
pub mod memory;
pub mod supabase;
