//! Profile persistence and validation for Shipit.
//!
//! This crate handles:
//! - Schema validation of profile tiers and secret payloads
//! - Durable, profile-scoped storage with inheritance and atomic writes
//! - Projection of a full profile into the minimal provisioning view

pub mod project;
pub mod schema;
pub mod store;

pub use project::project;
pub use schema::{ValidationResult, coerce_bool, validate};
pub use store::ProfileStore;
