//! Quiz documents and correct-answer resolution.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{optional_str, parse_root, require_array, require_object, require_str, ValidationError};

/// A validated, enriched quiz body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct QuizDocument {
    pub id: i64,
    pub name: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct Question {
    #[serde(rename = "question", alias = "text")]
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    /// `None` marks the question invalid: it is shown but never scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Question {
    /// Whether this question takes part in scoring.
    pub fn is_scorable(&self) -> bool {
        self.correct_index.is_some()
    }

    /// Check a chosen option. Unscorable questions are never correct.
    pub fn is_correct(&self, choice: usize) -> bool {
        self.correct_index == Some(choice)
    }
}

impl QuizDocument {
    pub fn scorable_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| q.is_scorable())
    }
}

/// A quiz body as found on disk, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuiz {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub questions: Vec<Question>,
}

/// Resolve the correct option of a question.
///
/// An explicit in-range index wins, and the caller takes that option as the
/// answer; otherwise the answer string must match an option exactly. No match yields `None` rather than defaulting to option 0.
pub fn resolve_correct_index(options: &[String], correct_answer: &str, explicit: Option<i64>) -> Option<usize> {
    if let Some(index) = explicit.and_then(|i| usize::try_from(i).ok()) {
        if let Some(option) = options.get(index) {
            if option != correct_answer {
                warn!(index, option = %option, answer = %correct_answer, "correctIndex disagrees with correctAnswer");
            }
            return Some(index);
        }
    }
    options.iter().position(|o| o == correct_answer)
}

impl ParsedQuiz {
    /// Parse and validate a quiz body.
    ///
    /// Every question needs text (`question` or `text`), an `options` array of
    /// strings and a `correctAnswer` string.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ValidationError> {
        let root = parse_root(bytes)?;
        let root = require_object(&root, "$")?;
        let raw_questions = require_array(root, "questions", "$")?;

        let mut questions = Vec::with_capacity(raw_questions.len());
        for (i, raw) in raw_questions.iter().enumerate() {
            let path = format!("questions[{}]", i);
            let obj = require_object(raw, &path)?;

            let text = optional_str(obj, "question")
                .or_else(|| optional_str(obj, "text"))
                .ok_or_else(|| ValidationError::new(format!("{}.question", path), "expected a string"))?;

            let options = require_array(obj, "options", &path)?
                .iter()
                .enumerate()
                .map(|(j, o)| {
                    o.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ValidationError::new(format!("{}.options[{}]", path, j), "expected a string"))
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut correct_answer = require_str(obj, "correctAnswer", &path)?;
            let explicit = obj.get("correctIndex").and_then(|v| v.as_i64());
            let correct_index = resolve_correct_index(&options, &correct_answer, explicit);
            match correct_index {
                // The resolved option is authoritative
                Some(index) => correct_answer = options[index].clone(),
                None => {
                    warn!(question = i, answer = %correct_answer, "No option matches correctAnswer; question excluded from scoring")
                }
            }

            questions.push(Question {
                text,
                options,
                correct_answer,
                correct_index,
                hint: optional_str(obj, "hint"),
                explanation: optional_str(obj, "explanation"),
                audio: optional_str(obj, "audio"),
            });
        }

        Ok(Self {
            id: root.get("id").and_then(|v| v.as_i64()),
            name: optional_str(root, "name"),
            questions,
        })
    }
}
