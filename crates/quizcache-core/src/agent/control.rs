//! Command/response protocol between the page and the agent.
//!
//! Wire form: `{"type": "CACHE_AUDIO", "audioUrls": [...]}` in, one JSON reply
//! out. Every handler reports its own failures in the reply.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::net::Request;

use super::notify::Permission;
use super::OfflineProxyAgent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub enum ControlMessage {
    SkipWaiting,
    GetVersion,
    ClearCache,
    CacheAudio {
        #[serde(rename = "audioUrls")]
        audio_urls: Vec<String>,
    },
    PrecacheAssets {
        assets: Vec<String>,
    },
    ScheduleNotification {
        title: String,
        body: String,
        /// Milliseconds
        delay: u64,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct StatusReply {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub enum AudioCacheStatus {
    Cached,
    AlreadyCached,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct AudioCacheDetail {
    pub url: String,
    pub status: AudioCacheStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct AudioBatchReply {
    pub success: bool,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub details: Vec<AudioCacheDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub struct PrecacheReply {
    pub success: bool,
    pub cached: usize,
    pub failed: usize,
}

/// Reply to a [`ControlMessage`]. Serialized without a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export, export_to = "quizcache/"))]
pub enum ControlReply {
    Version { version: String },
    AudioBatch(AudioBatchReply),
    Precache(PrecacheReply),
    Status(StatusReply),
}

impl ControlReply {
    pub fn status(success: bool, message: impl Into<String>) -> Self {
        ControlReply::Status(StatusReply {
            success,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        match self {
            ControlReply::Version { .. } => true,
            ControlReply::AudioBatch(r) => r.success,
            ControlReply::Precache(r) => r.success,
            ControlReply::Status(r) => r.success,
        }
    }
}

/// Parse a wire message; a malformed one becomes its failure reply.
pub fn parse_wire(value: serde_json::Value) -> Result<ControlMessage, ControlReply> {
    serde_json::from_value(value).map_err(|e| ControlReply::status(false, format!("Malformed message: {}", e)))
}

pub fn reply_to_wire(reply: &ControlReply) -> serde_json::Value {
    serde_json::to_value(reply)
        .unwrap_or_else(|e| serde_json::json!({"success": false, "message": e.to_string()}))
}

impl OfflineProxyAgent {
    /// Handle a JSON message and produce its JSON reply.
    pub async fn handle_wire(&self, value: serde_json::Value) -> serde_json::Value {
        let reply = match parse_wire(value) {
            Ok(message) => self.handle_message(message).await,
            Err(reply) => reply,
        };
        reply_to_wire(&reply)
    }

    pub async fn handle_message(&self, message: ControlMessage) -> ControlReply {
        debug!(?message, "Control message");
        match message {
            ControlMessage::SkipWaiting => {
                let activated = self.skip_waiting().await;
                ControlReply::status(true, if activated { "Activated" } else { "Already active" })
            }
            ControlMessage::GetVersion => ControlReply::Version {
                version: self.static_name.clone(),
            },
            ControlMessage::ClearCache => self.clear_caches().await,
            ControlMessage::CacheAudio { audio_urls } => ControlReply::AudioBatch(self.cache_audio(&audio_urls).await),
            ControlMessage::PrecacheAssets { assets } => ControlReply::Precache(self.precache_assets(&assets).await),
            ControlMessage::ScheduleNotification { title, body, delay } => {
                self.schedule_notification(title, body, Duration::from_millis(delay)).await
            }
            ControlMessage::Unknown => {
                warn!("Unknown control message type");
                ControlReply::status(false, "Unknown message type")
            }
        }
    }

    /// Delete every store in this application's namespace.
    async fn clear_caches(&self) -> ControlReply {
        let mut cleared = 0;
        let mut errors = Vec::new();
        for name in self.storage.keys().await {
            if !self.is_namespaced(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => cleared += 1,
                Err(e) => errors.push(format!("{}: {}", name, e)),
            }
        }

        if errors.is_empty() {
            info!(cleared, "Cleared all caches");
            ControlReply::status(true, format!("Cleared {} caches", cleared))
        } else {
            warn!(?errors, "Failed to clear some caches");
            ControlReply::status(false, format!("Failed to clear caches: {}", errors.join("; ")))
        }
    }

    /// Prefetch audio files into the dynamic store, one at a time.
    async fn cache_audio(&self, urls: &[String]) -> AudioBatchReply {
        let mut reply = AudioBatchReply {
            success: true,
            cached: 0,
            skipped: 0,
            failed: 0,
            details: Vec::with_capacity(urls.len()),
        };

        let Some(store) = self.open_store(&self.dynamic_name).await else {
            reply.success = false;
            reply.failed = urls.len();
            return reply;
        };

        for raw in urls {
            let detail = self.cache_one_audio(&store, raw).await;
            match detail.status {
                AudioCacheStatus::Cached => reply.cached += 1,
                AudioCacheStatus::AlreadyCached => reply.skipped += 1,
                AudioCacheStatus::Failed => reply.failed += 1,
            }
            reply.details.push(detail);
            // Let interception events run between downloads
            tokio::task::yield_now().await;
        }

        info!(cached = reply.cached, skipped = reply.skipped, failed = reply.failed, "Audio batch complete");
        reply
    }

    async fn cache_one_audio(&self, store: &Arc<crate::store::CacheStore>, raw: &str) -> AudioCacheDetail {
        let failed = |error: String| AudioCacheDetail {
            url: raw.to_string(),
            status: AudioCacheStatus::Failed,
            error: Some(error),
        };

        let url = match self.resolve(raw) {
            Ok(url) => url,
            Err(e) => return failed(format!("invalid URL: {}", e)),
        };
        let request = Request::get(url).with_timeout(self.audio_timeout);
        if store.contains(&request).await {
            return AudioCacheDetail {
                url: raw.to_string(),
                status: AudioCacheStatus::AlreadyCached,
                error: None,
            };
        }

        match self.network.fetch(&request).await {
            Ok(response) if response.is_ok() => match store.put(&request, &response).await {
                Ok(()) => AudioCacheDetail {
                    url: raw.to_string(),
                    status: AudioCacheStatus::Cached,
                    error: None,
                },
                Err(e) => failed(e.to_string()),
            },
            Ok(response) => failed(format!("HTTP {}", response.status)),
            Err(e) => failed(e.to_string()),
        }
    }

    async fn precache_assets(&self, assets: &[String]) -> PrecacheReply {
        let mut reply = PrecacheReply {
            success: true,
            cached: 0,
            failed: 0,
        };
        let Some(store) = self.open_store(&self.static_name).await else {
            reply.success = false;
            reply.failed = assets.len();
            return reply;
        };

        for raw in assets {
            let Ok(url) = self.resolve(raw) else {
                warn!(asset = %raw, "Invalid asset URL");
                reply.failed += 1;
                continue;
            };
            let request = Request::get(url);
            let stored = match self.network.fetch(&request).await {
                Ok(response) if response.is_ok() => store.put(&request, &response).await.is_ok(),
                Ok(_) | Err(_) => false,
            };
            if stored {
                reply.cached += 1;
            } else {
                warn!(asset = %raw, "Failed to precache asset");
                reply.failed += 1;
            }
            tokio::task::yield_now().await;
        }
        reply
    }

    async fn schedule_notification(&self, title: String, body: String, delay: Duration) -> ControlReply {
        let mut permission = self.notifier.permission();
        if permission == Permission::Default {
            permission = self.notifier.request_permission().await;
        }
        if permission != Permission::Granted {
            return ControlReply::status(false, "Notification permission denied");
        }

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            notifier.show(&title, &body).await;
        });
        ControlReply::status(true, format!("Notification scheduled in {} ms", delay.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::agent::notify::Notifier;
    use crate::agent::testing::{agent_with, test_config, url};
    use crate::store::CacheStorage;
    use crate::test_support::FakeNetwork;

    struct ScriptedNotifier {
        initial: Permission,
        answer: Permission,
        asked: AtomicUsize,
        shown: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for ScriptedNotifier {
        fn permission(&self) -> Permission {
            self.initial
        }

        async fn request_permission(&self) -> Permission {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }

        async fn show(&self, title: &str, _body: &str) {
            self.shown.lock().unwrap().push(title.to_string());
        }
    }

    fn agent_with_notifier(notifier: Arc<ScriptedNotifier>) -> OfflineProxyAgent {
        OfflineProxyAgent::new(
            &test_config(),
            Arc::new(CacheStorage::in_memory()),
            Arc::new(FakeNetwork::new()),
            notifier,
        )
        .unwrap()
    }

    #[test]
    fn test_wire_parsing() {
        assert_eq!(parse_wire(json!({"type": "GET_VERSION"})), Ok(ControlMessage::GetVersion));
        assert_eq!(
            parse_wire(json!({"type": "CACHE_AUDIO", "audioUrls": ["a.mp3"]})),
            Ok(ControlMessage::CacheAudio {
                audio_urls: vec!["a.mp3".to_string()]
            })
        );
        assert_eq!(parse_wire(json!({"type": "REBOOT"})), Ok(ControlMessage::Unknown));
        assert!(parse_wire(json!({"type": "CACHE_AUDIO"})).is_err());
    }

    #[cfg(feature = "ts")]
    #[test]
    fn test_wire_types_export_typescript() {
        use ts_rs::TS;
        assert!(ControlMessage::decl().contains("SKIP_WAITING"));
        assert!(ControlMessage::output_path().is_some());
        assert!(ControlReply::output_path().is_some());
    }

    #[tokio::test]
    async fn test_get_version() {
        let (agent, _) = agent_with(&test_config(), Arc::new(FakeNetwork::new()));
        let reply = agent.handle_wire(json!({"type": "GET_VERSION"})).await;
        assert_eq!(reply, json!({"version": "app-cache-v2"}));
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let (agent, _) = agent_with(&test_config(), Arc::new(FakeNetwork::new()));
        let reply = agent.handle_wire(json!({"type": "SELF_DESTRUCT"})).await;
        assert_eq!(reply, json!({"success": false, "message": "Unknown message type"}));
    }

    #[tokio::test]
    async fn test_malformed_message_still_replies() {
        let (agent, _) = agent_with(&test_config(), Arc::new(FakeNetwork::new()));
        let reply = agent.handle_wire(json!({"no_type": true})).await;
        assert_eq!(reply["success"], json!(false));
    }

    #[tokio::test]
    async fn test_clear_cache_is_idempotent() {
        let (agent, storage) = agent_with(&test_config(), Arc::new(FakeNetwork::new()));
        storage.open("app-cache-v2").await.unwrap();
        storage.open("app-cache-dynamic").await.unwrap();
        storage.open("unrelated").await.unwrap();

        for _ in 0..2 {
            let reply = agent.handle_message(ControlMessage::ClearCache).await;
            assert!(reply.is_success());
            assert_eq!(storage.keys().await, vec!["unrelated".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_cache_audio_partial_failure() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/audio/Colors/red.mp3", "red");
        network.body("http://localhost:8080/audio/Colors/blue.mp3", "blue");
        let (agent, storage) = agent_with(&test_config(), network.clone());
        let dynamic = storage.open("app-cache-dynamic").await.unwrap();
        dynamic
            .put(
                &Request::get(url("audio/Colors/blue.mp3")),
                &crate::net::Response::synthetic(200, "audio/mpeg", "cached"),
            )
            .await
            .unwrap();

        let reply = agent
            .handle_message(ControlMessage::CacheAudio {
                audio_urls: vec![
                    "./audio/Colors/red.mp3".to_string(),
                    "./audio/Colors/blue.mp3".to_string(),
                    "./audio/Colors/green.mp3".to_string(),
                ],
            })
            .await;

        let ControlReply::AudioBatch(batch) = reply else {
            panic!("expected an audio batch reply");
        };
        assert!(batch.success);
        assert_eq!((batch.cached, batch.skipped, batch.failed), (1, 1, 1));
        assert_eq!(batch.details[2].status, AudioCacheStatus::Failed);
        assert_eq!(batch.details[2].error.as_deref(), Some("HTTP 404"));
        // Already cached entries are not refetched
        assert_eq!(network.calls_to("http://localhost:8080/audio/Colors/blue.mp3"), 0);
        assert!(dynamic.contains(&Request::get(url("audio/Colors/red.mp3"))).await);
    }

    #[tokio::test]
    async fn test_precache_assets() {
        let network = Arc::new(FakeNetwork::new());
        network.body("http://localhost:8080/img/a.png", "a");
        let (agent, storage) = agent_with(&test_config(), network);

        let reply = agent
            .handle_message(ControlMessage::PrecacheAssets {
                assets: vec!["img/a.png".to_string(), "img/missing.png".to_string()],
            })
            .await;
        assert_eq!(
            reply,
            ControlReply::Precache(PrecacheReply {
                success: true,
                cached: 1,
                failed: 1
            })
        );
        assert!(storage.get("app-cache-v2").await.unwrap().contains(&Request::get(url("img/a.png"))).await);
    }

    #[tokio::test]
    async fn test_notification_asks_when_undetermined() {
        let notifier = Arc::new(ScriptedNotifier {
            initial: Permission::Default,
            answer: Permission::Granted,
            asked: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        });
        let agent = agent_with_notifier(notifier.clone());

        let reply = agent
            .handle_message(ControlMessage::ScheduleNotification {
                title: "Practice time".to_string(),
                body: "Keep your streak".to_string(),
                delay: 10,
            })
            .await;
        assert!(reply.is_success());
        assert_eq!(notifier.asked.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*notifier.shown.lock().unwrap(), vec!["Practice time".to_string()]);
    }

    #[tokio::test]
    async fn test_notification_denied() {
        let notifier = Arc::new(ScriptedNotifier {
            initial: Permission::Denied,
            answer: Permission::Granted,
            asked: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        });
        let agent = agent_with_notifier(notifier.clone());

        let reply = agent
            .handle_message(ControlMessage::ScheduleNotification {
                title: "t".to_string(),
                body: "b".to_string(),
                delay: 0,
            })
            .await;
        assert!(!reply.is_success());
        assert_eq!(notifier.asked.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reply_wire_shapes() {
        let batch = ControlReply::AudioBatch(AudioBatchReply {
            success: true,
            cached: 1,
            skipped: 0,
            failed: 0,
            details: vec![AudioCacheDetail {
                url: "a.mp3".to_string(),
                status: AudioCacheStatus::AlreadyCached,
                error: None,
            }],
        });
        assert_eq!(
            reply_to_wire(&batch),
            json!({"success": true, "cached": 1, "skipped": 0, "failed": 0,
                   "details": [{"url": "a.mp3", "status": "already-cached"}]})
        );
    }
}
