//! Request descriptors and response snapshots.

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use super::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page navigation
    Navigate,
    Cors,
    NoCors,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub accept: Option<String>,
    /// `None` waits for as long as the transport allows.
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Cors,
            accept: None,
            timeout: None,
        }
    }

    pub fn head(url: Url) -> Self {
        Self {
            method: Method::HEAD,
            ..Self::get(url)
        }
    }

    /// A page navigation accepting HTML.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            accept: Some("text/html,application/xhtml+xml".to_string()),
            ..Self::get(url)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// The same request with no timeout.
    pub fn without_timeout(&self) -> Self {
        Self {
            timeout: None,
            ..self.clone()
        }
    }

    /// Key under which the response is stored: method + URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn is_html_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
            || self
                .accept
                .as_deref()
                .map(|a| a.contains("text/html"))
                .unwrap_or(false)
    }
}

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin
    Basic,
    /// Cross-origin, readable
    Cors,
    /// Cross-origin, unreadable
    Opaque,
    /// Generated locally, never from the network
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>, kind: ResponseKind) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            kind,
        }
    }

    /// A locally generated response.
    pub fn synthetic(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(
            status,
            vec![("content-type".to_string(), content_type.to_string())],
            body,
            ResponseKind::Synthetic,
        )
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Turn a non-OK status into a [`FetchError::Status`].
    pub fn error_for_status(self, url: &Url) -> Result<Self, FetchError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(FetchError::Status {
                status: self.status,
                url: url.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_cache_key_includes_method() {
        let get = Request::get(url("http://localhost/a.json"));
        let head = Request::head(url("http://localhost/a.json"));
        assert_eq!(get.cache_key(), "GET http://localhost/a.json");
        assert_ne!(get.cache_key(), head.cache_key());
    }

    #[test]
    fn test_html_navigation_detection() {
        assert!(Request::navigate(url("http://localhost/")).is_html_navigation());
        assert!(Request::get(url("http://localhost/x"))
            .with_accept("text/html")
            .is_html_navigation());
        assert!(!Request::get(url("http://localhost/app.js")).is_html_navigation());
    }

    #[test]
    fn test_without_timeout_keeps_everything_else() {
        let req = Request::navigate(url("http://localhost/")).with_timeout(Duration::from_secs(3));
        let bare = req.without_timeout();
        assert_eq!(bare.timeout, None);
        assert_eq!(bare.mode, RequestMode::Navigate);
        assert_eq!(bare.url, req.url);
    }

    #[test]
    fn test_error_for_status() {
        let u = url("http://localhost/missing.json");
        let err = Response::synthetic(404, "text/plain", "").error_for_status(&u).unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(Response::synthetic(200, "text/plain", "ok").error_for_status(&u).is_ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = Response::synthetic(200, "application/json", "{}");
        assert_eq!(resp.header("Content-Type"), Some("application/json"));
        assert_eq!(resp.header("date"), None);
    }
}
