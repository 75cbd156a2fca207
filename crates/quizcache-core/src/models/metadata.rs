//! The theme index document.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{optional_str, parse_root, require_array, require_id, require_object, require_str, ValidationError};

/// The theme index. Valid only with at least one theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct Metadata {
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quizzes: Vec<QuizRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct QuizRef {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Metadata {
    /// Parse and validate a `metadata.json` body.
    ///
    /// Every theme needs `id`, `name`, `icon` and a `quizzes` array; every quiz
    /// needs `id` and `name`. Theme ids must be positive and unique, quiz ids
    /// unique across all themes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ValidationError> {
        let root = parse_root(bytes)?;
        let root = require_object(&root, "$")?;
        let raw_themes = require_array(root, "themes", "$")?;
        if raw_themes.is_empty() {
            return Err(ValidationError::new("$.themes", "must contain at least one theme"));
        }

        let mut theme_ids = HashSet::new();
        let mut quiz_ids = HashSet::new();
        let mut themes = Vec::with_capacity(raw_themes.len());

        for (i, raw) in raw_themes.iter().enumerate() {
            let path = format!("themes[{}]", i);
            let obj = require_object(raw, &path)?;
            let id = require_id(obj, "id", &path)?;
            if id <= 0 {
                return Err(ValidationError::new(format!("{}.id", path), "must be positive"));
            }
            if !theme_ids.insert(id) {
                return Err(ValidationError::new(format!("{}.id", path), format!("duplicate theme id {}", id)));
            }

            let raw_quizzes = require_array(obj, "quizzes", &path)?;
            let mut quizzes = Vec::with_capacity(raw_quizzes.len());
            for (j, raw_quiz) in raw_quizzes.iter().enumerate() {
                let quiz_path = format!("{}.quizzes[{}]", path, j);
                let quiz_obj = require_object(raw_quiz, &quiz_path)?;
                let quiz_id = require_id(quiz_obj, "id", &quiz_path)?;
                if !quiz_ids.insert(quiz_id) {
                    return Err(ValidationError::new(
                        format!("{}.id", quiz_path),
                        format!("duplicate quiz id {}", quiz_id),
                    ));
                }
                quizzes.push(QuizRef {
                    id: quiz_id,
                    name: require_str(quiz_obj, "name", &quiz_path)?,
                    description: optional_str(quiz_obj, "description"),
                });
            }

            themes.push(Theme {
                id,
                name: require_str(obj, "name", &path)?,
                icon: require_str(obj, "icon", &path)?,
                description: optional_str(obj, "description"),
                quizzes,
            });
        }

        Ok(Self { themes })
    }

    /// Minimal navigable index used when no metadata source is available.
    pub fn builtin_fallback() -> Self {
        Self {
            themes: vec![Theme {
                id: 1,
                name: "General Knowledge".to_string(),
                icon: "📚".to_string(),
                description: Some("Content is temporarily unavailable".to_string()),
                quizzes: vec![QuizRef {
                    id: 101,
                    name: "Quiz 1".to_string(),
                    description: None,
                }],
            }],
        }
    }

    pub fn theme(&self, theme_id: i64) -> Option<&Theme> {
        self.themes.iter().find(|t| t.id == theme_id)
    }

    /// Look up a quiz reference within a specific theme.
    pub fn quiz(&self, theme_id: i64, quiz_id: i64) -> Option<&QuizRef> {
        self.theme(theme_id)
            .and_then(|t| t.quizzes.iter().find(|q| q.id == quiz_id))
    }

    pub fn quiz_count(&self) -> usize {
        self.themes.iter().map(|t| t.quizzes.len()).sum()
    }
}
