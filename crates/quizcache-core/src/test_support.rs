//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::loader::ErrorReporter;
use crate::net::{Fetch, FetchError, Request, Response, ResponseKind};

/// Scripted network: fixed responses per URL, 404 otherwise.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
    timeouts: Mutex<Vec<Option<Duration>>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub(crate) fn json(&self, url: &str, body: &str) {
        self.route(
            url,
            Response::new(
                200,
                vec![("content-type".to_string(), "application/json".to_string())],
                body.to_string(),
                ResponseKind::Basic,
            ),
        );
    }

    pub(crate) fn body(&self, url: &str, body: &str) {
        self.route(url, Response::new(200, Vec::new(), body.to_string(), ResponseKind::Basic));
    }

    /// Hold responses for `url` back by `delay`.
    pub(crate) fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Timeout of every request seen, in call order.
    pub(crate) fn timeouts(&self) -> Vec<Option<Duration>> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        self.timeouts.lock().unwrap().push(request.timeout);
        let delay = self.delays.lock().unwrap().get(&url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(url));
        }
        let routed = self.routes.lock().unwrap().get(&url).cloned();
        Ok(routed.unwrap_or_else(|| Response::new(404, Vec::new(), "not found", ResponseKind::Basic)))
    }
}

/// Collects reported messages.
#[derive(Default)]
pub(crate) struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
