//! Per-request strategy selection.
//!
//! | class    | order                                      | write-back     |
//! |----------|--------------------------------------------|----------------|
//! | audio    | dynamic, static, network, bare retry, 404  | dynamic        |
//! | content  | network, dynamic, static, untimed retry    | dynamic        |
//! | static   | static, dynamic, network, offline page     | static         |

use reqwest::Method;
use tracing::{debug, warn};

use crate::net::{FetchError, Request, Response, ResponseKind};

use super::lifecycle::LifecycleState;
use super::OfflineProxyAgent;

const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg", ".m4a"];

/// Served for HTML navigations that fail with no cached copy.
const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
body { font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #f4f4f8; color: #333; }
main { text-align: center; padding: 2rem; }
button { margin-top: 1rem; padding: 0.6rem 1.4rem; border: 0; border-radius: 6px; background: #4a6cf7; color: #fff; font-size: 1rem; }
</style>
</head>
<body>
<main>
<h1>You're offline</h1>
<p>This page isn't available without a connection. Quizzes you've already opened still work.</p>
<button onclick="location.reload()">Try again</button>
</main>
</body>
</html>
"#;

const OFFLINE_JSON: &str = r#"{"error":"offline","message":"Content unavailable offline"}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Not ours to intercept (non-HTTP scheme)
    Passthrough,
    /// Straight to the network, never cached (HEAD and other non-GET methods)
    NetworkOnly,
    Audio,
    Content,
    Static,
}

fn is_audio_path(path: &str) -> bool {
    path.split('/').any(|segment| segment == "audio") && AUDIO_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Classify a request. First match wins.
pub fn classify(request: &Request) -> RouteClass {
    if !matches!(request.url.scheme(), "http" | "https") {
        return RouteClass::Passthrough;
    }
    if request.method != Method::GET {
        return RouteClass::NetworkOnly;
    }
    let path = request.url.path().to_ascii_lowercase();
    if is_audio_path(&path) {
        RouteClass::Audio
    } else if path.ends_with(".json") {
        RouteClass::Content
    } else {
        RouteClass::Static
    }
}

impl OfflineProxyAgent {
    /// Answer one intercepted request.
    ///
    /// Only static-class failures of non-navigation requests come back as
    /// errors; every other path ends in a response, synthesized if need be.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, FetchError> {
        if self.state().await != LifecycleState::Active {
            return self.network.fetch(request).await;
        }

        let class = classify(request);
        debug!(url = %request.url, ?class, "Intercepted request");
        match class {
            RouteClass::Passthrough | RouteClass::NetworkOnly => self.network.fetch(request).await,
            RouteClass::Audio => Ok(self.serve_audio(request).await),
            RouteClass::Content => Ok(self.serve_content(request).await),
            RouteClass::Static => self.serve_static(request).await,
        }
    }

    async fn serve_audio(&self, request: &Request) -> Response {
        if let Some(hit) = self.lookup(&self.dynamic_name, request).await {
            return hit;
        }
        if let Some(hit) = self.lookup(&self.static_name, request).await {
            return hit;
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.remember(&self.dynamic_name, request, &response).await;
                }
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Audio fetch failed; retrying once");
                match self.network.fetch(request).await {
                    Ok(response) => response,
                    Err(_) => Response::synthetic(404, "text/plain", "Audio unavailable offline"),
                }
            }
        }
    }

    async fn serve_content(&self, request: &Request) -> Response {
        let failed = match self.network.fetch(request).await {
            Ok(response) if response.is_ok() => {
                self.remember(&self.dynamic_name, request, &response).await;
                return response;
            }
            Ok(response) => {
                warn!(url = %request.url, status = response.status, "Content fetch returned error status; trying caches");
                Some(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Content fetch failed; trying caches");
                None
            }
        };

        if let Some(hit) = self.lookup(&self.dynamic_name, request).await {
            return hit;
        }
        if let Some(hit) = self.lookup(&self.static_name, request).await {
            return hit;
        }
        // Both stores missed: pass the server's error status through
        if let Some(response) = failed {
            return response;
        }

        match self.network.fetch(&request.without_timeout()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Content unavailable");
                Response::synthetic(503, "application/json", OFFLINE_JSON)
            }
        }
    }

    async fn serve_static(&self, request: &Request) -> Result<Response, FetchError> {
        if let Some(hit) = self.lookup(&self.static_name, request).await {
            return Ok(hit);
        }
        if let Some(hit) = self.lookup(&self.dynamic_name, request).await {
            return Ok(hit);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok() && matches!(response.kind, ResponseKind::Basic | ResponseKind::Cors) {
                    self.remember(&self.static_name, request, &response).await;
                }
                Ok(response)
            }
            Err(e) if request.is_html_navigation() => {
                warn!(url = %request.url, error = %e, "Navigation failed; serving offline page");
                Ok(Response::synthetic(503, "text/html; charset=utf-8", OFFLINE_PAGE))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::agent::testing::{agent_with, test_config, url};
    use crate::agent::OfflineProxyAgent;
    use crate::store::CacheStorage;
    use crate::test_support::FakeNetwork;
    use url::Url;

    async fn active_agent(network: Arc<FakeNetwork>) -> (OfflineProxyAgent, Arc<CacheStorage>) {
        let config = crate::config::Config {
            precache_manifest: Vec::new(),
            ..test_config()
        };
        let (agent, storage) = agent_with(&config, network);
        agent.activate().await;
        (agent, storage)
    }

    fn tagged(body: &str) -> Response {
        Response::new(200, Vec::new(), body.to_string(), ResponseKind::Basic)
    }

    async fn body_of(agent: &OfflineProxyAgent, request: &Request) -> String {
        let response = agent.handle_fetch(request).await.unwrap();
        String::from_utf8(response.body.to_vec()).unwrap()
    }

    #[test]
    fn test_classify() {
        let get = |s: &str| Request::get(Url::parse(s).unwrap());
        assert_eq!(classify(&get("chrome-extension://abc/script.js")), RouteClass::Passthrough);
        assert_eq!(
            classify(&Request::head(url("audio/Colors/red.mp3"))),
            RouteClass::NetworkOnly
        );
        assert_eq!(classify(&get("http://localhost:8080/audio/Colors/red.mp3")), RouteClass::Audio);
        assert_eq!(classify(&get("http://localhost:8080/music/red.mp3")), RouteClass::Static);
        assert_eq!(classify(&get("http://localhost:8080/data/metadata.json")), RouteClass::Content);
        assert_eq!(classify(&get("http://localhost:8080/audio/list.json")), RouteClass::Content);
        assert_eq!(classify(&get("http://localhost:8080/js/app.js")), RouteClass::Static);
    }

    #[tokio::test]
    async fn test_audio_prefers_dynamic_then_static_then_network() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/audio/Colors/red.mp3", "network");
        let (agent, storage) = active_agent(network.clone()).await;
        let request = Request::get(url("audio/Colors/red.mp3"));

        let static_store = storage.open("app-cache-v2").await.unwrap();
        let dynamic_store = storage.open("app-cache-dynamic").await.unwrap();
        static_store.put(&request, &tagged("static")).await.unwrap();
        dynamic_store.put(&request, &tagged("dynamic")).await.unwrap();
        assert_eq!(body_of(&agent, &request).await, "dynamic");

        dynamic_store.delete_key(&request.cache_key()).await.unwrap();
        assert_eq!(body_of(&agent, &request).await, "static");

        static_store.delete_key(&request.cache_key()).await.unwrap();
        assert_eq!(body_of(&agent, &request).await, "network");
        assert_eq!(network.total_calls(), 1);
        // Refilled into the dynamic store
        assert!(dynamic_store.contains(&request).await);
    }

    #[tokio::test]
    async fn test_audio_offline_synthesizes_404() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, _) = active_agent(network.clone()).await;
        network.set_offline(true);

        let response = agent.handle_fetch(&Request::get(url("audio/Colors/red.mp3"))).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.kind, ResponseKind::Synthetic);
        // One attempt plus one bare retry
        assert_eq!(network.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_audio_error_status_not_cached() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, storage) = active_agent(network).await;
        let request = Request::get(url("audio/Colors/missing.mp3"));

        let response = agent.handle_fetch(&request).await.unwrap();
        assert_eq!(response.status, 404);
        let dynamic = storage.get("app-cache-dynamic").await.unwrap();
        assert!(!dynamic.contains(&request).await);
    }

    #[tokio::test]
    async fn test_content_is_network_first_and_mirrored() {
        let network = Arc::new(FakeNetwork::new());
        network.json("http://localhost:8080/data/metadata.json", r#"{"v":2}"#);
        let (agent, storage) = active_agent(network.clone()).await;
        let request = Request::get(url("data/metadata.json"));

        let dynamic = storage.open("app-cache-dynamic").await.unwrap();
        dynamic.put(&request, &tagged(r#"{"v":1}"#)).await.unwrap();

        assert_eq!(body_of(&agent, &request).await, r#"{"v":2}"#);
        assert_eq!(dynamic.match_request(&request).await.unwrap().body, r#"{"v":2}"#);

        network.set_offline(true);
        assert_eq!(body_of(&agent, &request).await, r#"{"v":2}"#);
    }

    #[tokio::test]
    async fn test_content_falls_back_to_static_store() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, storage) = active_agent(network.clone()).await;
        let request = Request::get(url("manifest.json"));
        storage.open("app-cache-v2").await.unwrap().put(&request, &tagged("{}")).await.unwrap();

        network.set_offline(true);
        assert_eq!(body_of(&agent, &request).await, "{}");
    }

    #[tokio::test]
    async fn test_content_offline_without_cache_is_503() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, _) = active_agent(network.clone()).await;
        network.set_offline(true);

        let request = Request::get(url("data/metadata.json")).with_timeout(std::time::Duration::from_secs(5));
        let response = agent.handle_fetch(&request).await.unwrap();
        assert_eq!(response.status, 503);
        // Timed attempt plus the untimed last resort
        assert_eq!(
            network.timeouts(),
            vec![Some(std::time::Duration::from_secs(5)), None]
        );
    }

    #[tokio::test]
    async fn test_content_error_status_falls_back_to_cache() {
        let network = Arc::new(FakeNetwork::new());
        network.route(
            "http://localhost:8080/data/metadata.json",
            Response::new(503, Vec::new(), "gateway down", ResponseKind::Basic),
        );
        let (agent, storage) = active_agent(network.clone()).await;
        let request = Request::get(url("data/metadata.json"));
        let dynamic = storage.open("app-cache-dynamic").await.unwrap();
        dynamic.put(&request, &tagged(r#"{"cached":true}"#)).await.unwrap();

        let response = agent.handle_fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"cached":true}"#);
        // The error response is not mirrored
        assert_eq!(dynamic.match_request(&request).await.unwrap().body, r#"{"cached":true}"#);
    }

    #[tokio::test]
    async fn test_content_error_status_without_cache_is_returned() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, _) = active_agent(network.clone()).await;

        let response = agent.handle_fetch(&Request::get(url("data/missing.json"))).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(network.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_static_cache_first_with_mirroring() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/css/styles.css", "body{}");
        let (agent, storage) = active_agent(network.clone()).await;
        let request = Request::get(url("css/styles.css"));

        assert_eq!(body_of(&agent, &request).await, "body{}");
        assert_eq!(body_of(&agent, &request).await, "body{}");
        assert_eq!(network.total_calls(), 1);
        assert!(storage.get("app-cache-v2").await.unwrap().contains(&request).await);
    }

    #[tokio::test]
    async fn test_static_opaque_response_not_mirrored() {
        let network = Arc::new(FakeNetwork::new());
        network.route(
            "http://localhost:8080/img/logo.png",
            Response::new(200, Vec::new(), "png", ResponseKind::Opaque),
        );
        let (agent, storage) = active_agent(network).await;
        let request = Request::get(url("img/logo.png"));

        agent.handle_fetch(&request).await.unwrap();
        assert!(storage.get("app-cache-v2").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_page() {
        let network = Arc::new(FakeNetwork::new());
        let (agent, _) = active_agent(network.clone()).await;
        network.set_offline(true);

        let response = agent.handle_fetch(&Request::navigate(url("about.html"))).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(String::from_utf8_lossy(&response.body).contains("offline"));

        let err = agent.handle_fetch(&Request::get(url("js/app.js"))).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_head_requests_bypass_caches() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/css/styles.css", "body{}");
        let (agent, storage) = active_agent(network.clone()).await;

        let request = Request::head(url("css/styles.css"));
        agent.handle_fetch(&request).await.unwrap();
        agent.handle_fetch(&request).await.unwrap();
        assert_eq!(network.total_calls(), 2);
        assert!(storage.get("app-cache-v2").await.is_none());
    }

    #[tokio::test]
    async fn test_not_active_passes_through() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/css/styles.css", "body{}");
        let (agent, storage) = agent_with(&test_config(), network);

        agent.handle_fetch(&Request::get(url("css/styles.css"))).await.unwrap();
        assert!(storage.keys().await.is_empty());
    }
}
