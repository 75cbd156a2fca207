use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use tracing::debug;

use crate::models::{Metadata, QuizDocument};

/// Metadata older than this is no longer served as fresh.
const METADATA_STALE_MINUTES: i64 = 5;

/// Default number of quiz documents held before LRU eviction.
pub const DEFAULT_QUIZ_CAPACITY: usize = 50;

/// Composite key of the quiz table: `(theme_id, quiz_id)`.
pub type QuizKey = (i64, i64);

#[derive(Debug, Clone)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.cached_at
    }

    /// Clock skew (an entry from the future) counts as fresh.
    pub fn is_older_than(&self, window: Duration) -> bool {
        self.age() >= window
    }
}

/// Partition selector for [`ResourceCache::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Metadata,
    Quizzes,
    All,
}

/// Bounded page-side cache.
///
/// Documents are handed out as `Arc`s: two hits on the same entry return the
/// same allocation.
pub struct ResourceCache {
    metadata: Option<CachedData<Arc<Metadata>>>,
    quizzes: LruCache<QuizKey, Arc<QuizDocument>>,
    stale_after: Duration,
}

impl ResourceCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            metadata: None,
            quizzes: LruCache::new(capacity),
            stale_after: Duration::minutes(METADATA_STALE_MINUTES),
        }
    }

    // ===== Metadata =====

    /// Fresh metadata only. A present but stale entry is a miss.
    pub fn get_metadata(&self) -> Option<Arc<Metadata>> {
        match &self.metadata {
            Some(cached) if !cached.is_older_than(self.stale_after) => {
                debug!("Metadata cache hit");
                Some(Arc::clone(&cached.data))
            }
            Some(_) => {
                debug!("Metadata cache entry is stale");
                None
            }
            None => None,
        }
    }

    /// Whatever metadata is cached, regardless of age.
    ///
    /// Only for use after a refresh attempt has failed.
    pub fn get_stale_metadata_for_fallback(&self) -> Option<Arc<Metadata>> {
        self.metadata.as_ref().map(|cached| Arc::clone(&cached.data))
    }

    /// Replace the metadata entry wholesale.
    pub fn put_metadata(&mut self, metadata: Arc<Metadata>) {
        self.metadata = Some(CachedData::new(metadata));
    }

    // ===== Quizzes =====

    /// Look up a quiz and mark it most recently used.
    pub fn get_quiz(&mut self, theme_id: i64, quiz_id: i64) -> Option<Arc<QuizDocument>> {
        let hit = self.quizzes.get(&(theme_id, quiz_id)).map(Arc::clone);
        debug!(theme_id, quiz_id, hit = hit.is_some(), "Quiz cache lookup");
        hit
    }

    /// Insert or overwrite a quiz.
    ///
    /// A new key at capacity evicts the least recently used entry first, which
    /// is returned.
    pub fn put_quiz(&mut self, theme_id: i64, quiz_id: i64, doc: Arc<QuizDocument>) -> Option<QuizKey> {
        let key = (theme_id, quiz_id);
        match self.quizzes.push(key, doc) {
            Some((evicted, _)) if evicted != key => {
                debug!(
                    evicted_theme = evicted.0,
                    evicted_quiz = evicted.1,
                    capacity = self.quizzes.cap().get(),
                    "Evicted least recently used quiz"
                );
                Some(evicted)
            }
            _ => None,
        }
    }

    pub fn contains_quiz(&self, theme_id: i64, quiz_id: i64) -> bool {
        self.quizzes.contains(&(theme_id, quiz_id))
    }

    pub fn quiz_count(&self) -> usize {
        self.quizzes.len()
    }

    pub fn quiz_capacity(&self) -> usize {
        self.quizzes.cap().get()
    }

    /// Keys from least to most recently used.
    pub fn quiz_keys_lru_order(&self) -> Vec<QuizKey> {
        self.quizzes.iter().rev().map(|(k, _)| *k).collect()
    }

    pub fn clear(&mut self, scope: CacheScope) {
        if matches!(scope, CacheScope::Metadata | CacheScope::All) {
            self.metadata = None;
        }
        if matches!(scope, CacheScope::Quizzes | CacheScope::All) {
            self.quizzes.clear();
        }
        debug!(?scope, "Resource cache cleared");
    }

    #[cfg(test)]
    pub(crate) fn backdate_metadata(&mut self, by: Duration) {
        if let Some(cached) = self.metadata.as_mut() {
            cached.cached_at = cached.cached_at - by;
        }
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_QUIZ_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

// ============================================================================
// Tests
// ============================================================================
