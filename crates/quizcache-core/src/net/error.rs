use thiserror::Error;

/// A retrieval failed: the request was rejected or came back non-OK.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Proxy agent unavailable: {0}")]
    AgentUnavailable(String),
}
