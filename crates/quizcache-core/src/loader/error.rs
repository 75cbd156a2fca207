use thiserror::Error;

use crate::models::ValidationError;
use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Network failure: {0}")]
    Network(#[from] FetchError),

    #[error("Invalid document: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unknown theme: {0}")]
    UnknownTheme(i64),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Quiz {quiz_id} (theme {theme_id}) is unavailable: {reason}")]
    QuizUnavailable {
        theme_id: i64,
        quiz_id: i64,
        #[source]
        reason: Box<LoadError>,
    },
}
