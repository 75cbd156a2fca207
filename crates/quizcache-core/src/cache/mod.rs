//! In-process caching for quiz content.
//!
//! This module provides the `ResourceCache` holding the two page-side
//! resource kinds, each with its own policy:
//! - the metadata document: one entry, fresh for 5 minutes, stale copy kept
//!   for fallback only
//! - quiz documents: LRU-bounded table keyed by `(theme_id, quiz_id)`

pub mod manager;

pub use manager::{CacheScope, CachedData, QuizKey, ResourceCache, DEFAULT_QUIZ_CAPACITY};
