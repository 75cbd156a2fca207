//! Real network access over `reqwest`.

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;
use url::{Origin, Url};

use super::{Fetch, FetchError, Request, Response, ResponseKind};

/// HTTP transport.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Origin,
}

impl HttpFetcher {
    /// Create a fetcher for an application served from `base_url`.
    ///
    /// The client carries no global timeout; each request sets its own.
    pub fn new(base_url: &Url) -> Result<Self, FetchError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            origin: base_url.origin(),
        })
    }

    fn classify(&self, url: &Url) -> ResponseKind {
        if url.origin() == self.origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        if let Some(ref accept) = request.accept {
            builder = builder.header(header::ACCEPT, accept.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(request.url.to_string())
            } else {
                FetchError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let kind = self.classify(response.url());
        let body = response.bytes().await?;

        debug!(url = %request.url, status, bytes = body.len(), "Network response");
        Ok(Response::new(status, headers, body, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_same_and_cross_origin() {
        let base = Url::parse("http://localhost:8080/app/").unwrap();
        let fetcher = HttpFetcher::new(&base).unwrap();
        assert_eq!(
            fetcher.classify(&Url::parse("http://localhost:8080/data/metadata.json").unwrap()),
            ResponseKind::Basic
        );
        assert_eq!(
            fetcher.classify(&Url::parse("https://cdn.example.com/font.woff2").unwrap()),
            ResponseKind::Cors
        );
    }
}
