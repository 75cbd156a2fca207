//! Network transport.
//!
//! Everything that retrieves a resource goes through the [`Fetch`] trait.
//! `HttpFetcher` talks to the real network; the page side uses an
//! `AgentHandle`, which routes each request through the offline proxy agent.

pub mod error;
pub mod http;
pub mod request;

use std::sync::Arc;

use async_trait::async_trait;

pub use error::FetchError;
pub use http::HttpFetcher;
pub use request::{Request, RequestMode, Response, ResponseKind};

/// A source of responses for requests.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        (**self).fetch(request).await
    }
}
