//! Shared types and database helpers for PledgeTrack
//!
//! Leaf crate used by both the billing crate and the API server.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{OrgCategory, RequestStatus, SubscriptionStatus};
