//! Install / activate state machine.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::net::Request;

use super::sweeper::{sweep, SweepReport};
use super::OfflineProxyAgent;

/// Maximum concurrent manifest downloads during install.
const MAX_CONCURRENT_PRECACHE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    New,
    Installing,
    /// Installed; an older version still controls the open pages
    Waiting,
    Activating,
    /// Intercepting requests
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted_stores: Vec<String>,
    pub sweep: SweepReport,
}

impl OfflineProxyAgent {
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
    }

    /// Precache the asset manifest into the static store.
    ///
    /// Best-effort: individual failures are tolerated, and installation
    /// completes even if nothing could be cached.
    pub async fn install(&self) -> InstallReport {
        self.set_state(LifecycleState::Installing).await;
        info!(version = %self.static_name, assets = self.manifest.len(), "Installing");

        let mut report = InstallReport::default();
        match self.open_store(&self.static_name).await {
            Some(store) => {
                let network = Arc::clone(&self.network);
                let results: Vec<bool> = stream::iter(self.manifest.clone())
                    .map(move |url| {
                        let store = Arc::clone(&store);
                        let network = Arc::clone(&network);
                        async move {
                            let request = Request::get(url);
                            match network.fetch(&request).await {
                                Ok(response) if response.is_ok() => match store.put(&request, &response).await {
                                    Ok(()) => true,
                                    Err(e) => {
                                        warn!(url = %request.url, error = %e, "Failed to store precached asset");
                                        false
                                    }
                                },
                                Ok(response) => {
                                    warn!(url = %request.url, status = response.status, "Precache asset returned error status");
                                    false
                                }
                                Err(e) => {
                                    warn!(url = %request.url, error = %e, "Failed to precache asset");
                                    false
                                }
                            }
                        }
                    })
                    .buffer_unordered(MAX_CONCURRENT_PRECACHE)
                    .collect()
                    .await;

                report.cached = results.iter().filter(|ok| **ok).count();
                report.failed = results.len() - report.cached;
            }
            None => report.failed = self.manifest.len(),
        }

        if report.cached == 0 && !self.manifest.is_empty() {
            error!(
                version = %self.static_name,
                failed = report.failed,
                "No assets precached - offline mode will not work"
            );
        } else {
            info!(cached = report.cached, failed = report.failed, "Install complete");
        }

        self.set_state(LifecycleState::Waiting).await;
        report
    }

    /// Whether an older version of this application left a static store
    /// behind, i.e. still controls open pages.
    pub async fn has_previous_version(&self) -> bool {
        self.storage
            .keys()
            .await
            .iter()
            .any(|name| self.is_namespaced(name) && *name != self.static_name && *name != self.dynamic_name)
    }

    /// Retire old versions, take control and sweep the dynamic store.
    pub async fn activate(&self) -> ActivationReport {
        self.set_state(LifecycleState::Activating).await;

        let mut report = ActivationReport::default();
        for name in self.storage.keys().await {
            if !self.is_namespaced(&name) || name == self.static_name || name == self.dynamic_name {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => {
                    info!(store = %name, "Deleted store from previous version");
                    report.deleted_stores.push(name);
                }
                Err(e) => warn!(store = %name, error = %e, "Failed to delete old store"),
            }
        }

        self.set_state(LifecycleState::Active).await;
        info!(version = %self.static_name, "Activated; controlling open pages");

        if let Some(dynamic) = self.open_store(&self.dynamic_name).await {
            report.sweep = sweep(&dynamic, self.dynamic_max_age, chrono::Utc::now()).await;
        }
        report
    }

    /// Activate a waiting version without waiting for pages to close.
    /// Returns whether a transition happened.
    pub async fn skip_waiting(&self) -> bool {
        if self.state().await != LifecycleState::Waiting {
            return false;
        }
        info!("Skipping wait; activating immediately");
        self.activate().await;
        true
    }
}
