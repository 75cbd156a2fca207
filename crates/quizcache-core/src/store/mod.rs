//! Persistent response store.
//!
//! A `CacheStorage` holds named `CacheStore`s, each mapping a request
//! (method + URL) to a response snapshot. With a backing directory every
//! store is a subdirectory and every entry one JSON file, written through on
//! each change so entries survive across sessions.

pub mod error;
pub mod storage;

pub use error::StoreError;
pub use storage::{CacheStorage, CacheStore, StoredResponse};
