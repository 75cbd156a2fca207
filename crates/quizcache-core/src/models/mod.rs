//! Data models for quiz content.
//!
//! - `Metadata`, `Theme`, `QuizRef`: the theme index (`metadata.json`)
//! - `QuizDocument`, `Question`: a single quiz body
//!
//! Both documents arrive as untrusted JSON and are validated into these types
//! before anything else sees them.

pub mod metadata;
pub mod quiz;

use thiserror::Error;

pub use metadata::{Metadata, QuizRef, Theme};
pub use quiz::{resolve_correct_index, ParsedQuiz, Question, QuizDocument};

/// A parsed document is missing part of its required shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {problem}")]
pub struct ValidationError {
    /// Location of the problem, e.g. `themes[1].quizzes[0].name`
    pub path: String,
    pub problem: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            problem: problem.into(),
        }
    }
}

// ============================================================================
// JSON shape helpers shared by the document validators
// ============================================================================

pub(crate) fn parse_root(bytes: &[u8]) -> Result<serde_json::Value, ValidationError> {
    serde_json::from_slice(bytes).map_err(|e| ValidationError::new("$", format!("invalid JSON: {}", e)))
}

pub(crate) fn require_object<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<&'a serde_json::Map<String, serde_json::Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, "expected an object"))
}

pub(crate) fn require_array<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
    path: &str,
) -> Result<&'a Vec<serde_json::Value>, ValidationError> {
    obj.get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ValidationError::new(format!("{}.{}", path, key), "expected an array"))
}

pub(crate) fn require_str(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    path: &str,
) -> Result<String, ValidationError> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ValidationError::new(format!("{}.{}", path, key), "expected a string"))
}

pub(crate) fn require_id(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    path: &str,
) -> Result<i64, ValidationError> {
    obj.get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ValidationError::new(format!("{}.{}", path, key), "expected an integer"))
}

pub(crate) fn optional_str(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(str::to_string)
}
