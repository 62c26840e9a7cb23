//! Vigil Types - Shared domain types
//!
//! This crate contains domain types used across Vigil services:
//! - Subject identity and token identifiers
//! - Subscription tiers
//! - Authenticated-subject output shared by all credential paths

pub mod auth;
pub mod subject;
pub mod tier;

pub use auth::*;
pub use subject::*;
pub use tier::*;
