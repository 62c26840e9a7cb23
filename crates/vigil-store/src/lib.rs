//! Vigil Store - Shared state backend
//!
//! All Vigil instances coordinate through a single shared key-value backend
//! supporting set-with-expiry, atomic create-if-absent, existence checks and
//! a liveness probe. This crate defines the contract ([`KeyValueStore`]) and
//! ships two implementations:
//!
//! - [`RedisStore`] for multi-instance deployments
//! - [`MemoryStore`] for tests and single-instance use
//!
//! Every backend call is bounded by a timeout; a timeout is reported as
//! [`StoreError::Unavailable`] so callers can degrade instead of blocking.

pub mod error;
pub mod kv;
pub mod memory;
pub mod redis_store;

pub use error::{StoreError, StoreResult};
pub use kv::{KeyValueStore, namespace};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
