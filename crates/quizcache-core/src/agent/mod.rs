//! Offline proxy agent.
//!
//! The agent sits between the page and the network. It is installed and
//! activated per version, answers intercepted requests from its persistent
//! stores or the network, and obeys commands sent over the control channel.
//!
//! - `lifecycle`: install / activate / skip-waiting
//! - `routing`: per-request strategy selection
//! - `control`: command/response protocol
//! - `sweeper`: age-based pruning of the dynamic store
//! - `runtime`: the agent's own task and the page-side `AgentHandle`

pub mod control;
pub mod lifecycle;
pub mod notify;
pub mod routing;
pub mod runtime;
pub mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::net::{Fetch, Request, Response};
use crate::store::{CacheStorage, CacheStore};

pub use control::{
    AudioBatchReply, AudioCacheDetail, AudioCacheStatus, ControlMessage, ControlReply, PrecacheReply, StatusReply,
};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleState};
pub use notify::{Notifier, Permission, TracingNotifier};
pub use routing::{classify, RouteClass};
pub use runtime::{spawn_agent, AgentHandle, ChannelError};
pub use sweeper::{sweep, SweepReport};

/// The background proxy for one application version.
pub struct OfflineProxyAgent {
    storage: Arc<CacheStorage>,
    network: Arc<dyn Fetch>,
    notifier: Arc<dyn Notifier>,
    origin: Url,
    prefix: String,
    static_name: String,
    dynamic_name: String,
    manifest: Vec<Url>,
    dynamic_max_age: chrono::Duration,
    audio_timeout: Duration,
    state: RwLock<LifecycleState>,
}

impl OfflineProxyAgent {
    pub fn new(
        config: &Config,
        storage: Arc<CacheStorage>,
        network: Arc<dyn Fetch>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let origin = config.base_url()?;
        let manifest = config
            .precache_manifest
            .iter()
            .map(|asset| config.asset_url(asset))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            storage,
            network,
            notifier,
            origin,
            prefix: config.cache_prefix.clone(),
            static_name: config.static_store_name(),
            dynamic_name: config.dynamic_store_name(),
            manifest,
            dynamic_max_age: config.dynamic_max_age(),
            audio_timeout: config.audio_timeout(),
            state: RwLock::new(LifecycleState::New),
        })
    }

    /// Name of this version's static store, which doubles as its version.
    pub fn version(&self) -> &str {
        &self.static_name
    }

    pub fn static_store_name(&self) -> &str {
        &self.static_name
    }

    pub fn dynamic_store_name(&self) -> &str {
        &self.dynamic_name
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Whether a store belongs to this application.
    fn is_namespaced(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// Resolve a page-relative URL against the application origin.
    fn resolve(&self, raw: &str) -> Result<Url, url::ParseError> {
        self.origin.join(raw)
    }

    async fn open_store(&self, name: &str) -> Option<Arc<CacheStore>> {
        match self.storage.open(name).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(store = %name, error = %e, "Failed to open store");
                None
            }
        }
    }

    /// Stored response from an existing store, without creating it.
    async fn lookup(&self, name: &str, request: &Request) -> Option<Response> {
        let store = self.storage.get(name).await?;
        store.match_request(request).await
    }

    /// Write-back of a confirmed network response. Failures only cost a
    /// future cache miss.
    async fn remember(&self, name: &str, request: &Request, response: &Response) -> bool {
        let Some(store) = self.open_store(name).await else {
            return false;
        };
        match store.put(request, response).await {
            Ok(()) => true,
            Err(e) => {
                warn!(store = %name, url = %request.url, error = %e, "Failed to store response");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::test_support::FakeNetwork;

    pub(crate) fn test_config() -> Config {
        Config {
            base_url: "http://localhost:8080/".to_string(),
            cache_prefix: "app-cache-".to_string(),
            cache_version: "v2".to_string(),
            precache_manifest: vec!["index.html".to_string(), "js/app.js".to_string()],
            ..Config::default()
        }
    }

    pub(crate) fn agent_with(config: &Config, network: Arc<FakeNetwork>) -> (OfflineProxyAgent, Arc<CacheStorage>) {
        let storage = Arc::new(CacheStorage::in_memory());
        let agent = OfflineProxyAgent::new(config, Arc::clone(&storage), network, Arc::new(TracingNotifier::default()))
            .unwrap();
        (agent, storage)
    }

    pub(crate) fn url(path: &str) -> Url {
        Url::parse("http://localhost:8080/").unwrap().join(path).unwrap()
    }
}
