//! Loader for the theme index and quiz bodies.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::ResourceCache;
use crate::config::Config;
use crate::models::{Metadata, ParsedQuiz, QuizDocument};
use crate::net::{Fetch, Request, Response};

use super::audio::{get_audio_path, question_audio_filename, quiz_path};
use super::{ErrorReporter, LoadError};

/// Shown when the theme index could only be served from the fallback.
const DEGRADED_METADATA_MESSAGE: &str =
    "Some content is unavailable right now. Please check your connection.";

/// Shown when a quiz cannot be loaded at all.
const QUIZ_UNAVAILABLE_MESSAGE: &str =
    "We couldn't load this quiz. Please check your connection and try again.";

/// Cache shared between the loader and anything else on the page side.
pub type SharedCache = Arc<Mutex<ResourceCache>>;

/// Fetches, validates and caches quiz content.
///
/// Construct once at startup and pass it to whatever needs content.
pub struct ResourceLoader {
    config: Arc<Config>,
    fetcher: Arc<dyn Fetch>,
    cache: SharedCache,
    reporter: Arc<dyn ErrorReporter>,
}

impl ResourceLoader {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn Fetch>,
        cache: SharedCache,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            config,
            fetcher,
            cache,
            reporter,
        }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    async fn get(&self, url: url::Url, timeout: std::time::Duration) -> Result<Response, LoadError> {
        let request = Request::get(url)
            .with_accept("application/json")
            .with_timeout(timeout);
        let response = self.fetcher.fetch(&request).await?;
        Ok(response.error_for_status(&request.url)?)
    }

    // ===== Metadata =====

    /// Load the theme index. Never fails.
    ///
    /// Order: fresh cache, network, stale cache, configured fallback.
    pub async fn load_metadata(&self) -> Arc<Metadata> {
        let enabled = self.config.cache_enabled;
        if enabled {
            if let Some(metadata) = self.cache.lock().await.get_metadata() {
                return metadata;
            }
        }

        match self.fetch_metadata().await {
            Ok(metadata) => {
                info!(themes = metadata.themes.len(), quizzes = metadata.quiz_count(), "Loaded metadata");
                let metadata = Arc::new(metadata);
                if enabled {
                    self.cache.lock().await.put_metadata(Arc::clone(&metadata));
                }
                metadata
            }
            Err(e) => {
                warn!(error = %e, "Metadata refresh failed");
                if enabled {
                    if let Some(stale) = self.cache.lock().await.get_stale_metadata_for_fallback() {
                        warn!("Serving stale metadata");
                        return stale;
                    }
                }
                warn!("No cached metadata; serving fallback index");
                self.reporter.report(DEGRADED_METADATA_MESSAGE);
                Arc::new(self.config.fallback_metadata())
            }
        }
    }

    async fn fetch_metadata(&self) -> Result<Metadata, LoadError> {
        let url = self
            .config
            .data_url("metadata.json")
            .map_err(|e| LoadError::InvalidUrl(e.to_string()))?;
        let response = self.get(url, self.config.metadata_timeout()).await?;
        Ok(Metadata::from_json(&response.body)?)
    }

    // ===== Quizzes =====

    /// Load one quiz.
    ///
    /// On failure a cached copy is served if one exists; otherwise the error
    /// names both identifiers.
    pub async fn load_quiz(&self, theme_id: i64, quiz_id: i64) -> Result<Arc<QuizDocument>, LoadError> {
        let enabled = self.config.cache_enabled;
        if enabled {
            if let Some(doc) = self.cache.lock().await.get_quiz(theme_id, quiz_id) {
                return Ok(doc);
            }
        }

        match self.fetch_quiz(theme_id, quiz_id).await {
            Ok(doc) => {
                debug!(theme_id, quiz_id, questions = doc.questions.len(), "Loaded quiz");
                let doc = Arc::new(doc);
                if enabled {
                    self.cache.lock().await.put_quiz(theme_id, quiz_id, Arc::clone(&doc));
                }
                Ok(doc)
            }
            Err(e) => {
                warn!(theme_id, quiz_id, error = %e, "Quiz load failed");
                if enabled {
                    if let Some(doc) = self.cache.lock().await.get_quiz(theme_id, quiz_id) {
                        warn!(theme_id, quiz_id, "Serving cached quiz after failed load");
                        return Ok(doc);
                    }
                }
                self.reporter.report(QUIZ_UNAVAILABLE_MESSAGE);
                Err(LoadError::QuizUnavailable {
                    theme_id,
                    quiz_id,
                    reason: Box::new(e),
                })
            }
        }
    }

    async fn fetch_quiz(&self, theme_id: i64, quiz_id: i64) -> Result<QuizDocument, LoadError> {
        let path = quiz_path(theme_id, quiz_id).ok_or(LoadError::UnknownTheme(theme_id))?;
        let url = self
            .config
            .data_url(&path)
            .map_err(|e| LoadError::InvalidUrl(e.to_string()))?;
        let response = self.get(url, self.config.quiz_timeout()).await?;
        let parsed = ParsedQuiz::from_json(&response.body)?;
        Ok(self.enrich(theme_id, quiz_id, parsed).await)
    }

    /// Fill in id, name and per-question audio paths.
    async fn enrich(&self, theme_id: i64, quiz_id: i64, parsed: ParsedQuiz) -> QuizDocument {
        let name = match parsed.name {
            Some(name) => name,
            None => self
                .cache
                .lock()
                .await
                .get_stale_metadata_for_fallback()
                .and_then(|m| m.quiz(theme_id, quiz_id).map(|q| q.name.clone()))
                .unwrap_or_else(|| format!("Quiz {}", quiz_id)),
        };

        let questions = parsed
            .questions
            .into_iter()
            .enumerate()
            .map(|(position, mut question)| {
                if question.audio.is_none() {
                    question.audio = question_audio_filename(theme_id, quiz_id, position)
                        .and_then(|file| get_audio_path(theme_id, &file));
                }
                question
            })
            .collect();

        QuizDocument {
            id: parsed.id.unwrap_or(quiz_id),
            name,
            questions,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
