//! Core library for quizcache.
//!
//! Two cooperating halves that share no memory:
//!
//! - The page side: `ResourceCache` (bounded, staleness-aware in-process cache)
//!   and `ResourceLoader` (fetch, validate, enrich, degrade gracefully).
//! - The agent side: `OfflineProxyAgent`, which intercepts every request the page
//!   makes, answers from the persistent `CacheStorage` or the network, manages
//!   versioned store rollover and answers `ControlMessage`s.
//!
//! The two halves talk only through `AgentHandle` (a message channel).

pub mod agent;
pub mod cache;
pub mod config;
pub mod loader;
pub mod models;
pub mod net;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use agent::{spawn_agent, AgentHandle, ChannelError, ControlMessage, ControlReply, OfflineProxyAgent};
pub use cache::{CacheScope, ResourceCache};
pub use config::Config;
pub use loader::{ErrorReporter, LoadError, ResourceLoader, TracingReporter};
pub use models::{Metadata, QuizDocument};
pub use net::{Fetch, FetchError, HttpFetcher, Request, Response};
pub use store::{CacheStorage, CacheStore};
