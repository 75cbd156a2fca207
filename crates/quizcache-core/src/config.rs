//! Application configuration management.
//!
//! Configuration is stored at `~/.config/quizcache/config.json` and may be
//! overridden by `QUIZCACHE_*` environment variables. Every numeric knob is
//! sanitized on load: out-of-range values fall back to their default with a
//! warning rather than failing startup.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::cache::DEFAULT_QUIZ_CAPACITY;
use crate::models::Metadata;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "quizcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Accepted range for every timeout, in milliseconds.
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 60_000;

const DEFAULT_METADATA_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_QUIZ_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_AUDIO_TIMEOUT_MS: u64 = 15_000;

/// Dynamic store entries older than this are swept on activation.
const DEFAULT_DYNAMIC_MAX_AGE_DAYS: i64 = 7;
const MAX_DYNAMIC_MAX_AGE_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin the application is served from
    pub base_url: String,
    /// Quiz content location, relative to `base_url`
    pub base_data_path: String,
    pub cache_enabled: bool,
    pub metadata_timeout_ms: u64,
    pub quiz_timeout_ms: u64,
    pub audio_timeout_ms: u64,
    pub max_quiz_cache_entries: usize,
    /// Namespace shared by every persistent store of this application
    pub cache_prefix: String,
    pub cache_version: String,
    /// Shell assets precached on install, relative to `base_url`
    pub precache_manifest: Vec<String>,
    /// Served when no metadata source works; built-in single theme if unset
    pub fallback_metadata: Option<Metadata>,
    pub store_dir: Option<PathBuf>,
    pub dynamic_max_age_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/".to_string(),
            base_data_path: "data/".to_string(),
            cache_enabled: true,
            metadata_timeout_ms: DEFAULT_METADATA_TIMEOUT_MS,
            quiz_timeout_ms: DEFAULT_QUIZ_TIMEOUT_MS,
            audio_timeout_ms: DEFAULT_AUDIO_TIMEOUT_MS,
            max_quiz_cache_entries: DEFAULT_QUIZ_CAPACITY,
            cache_prefix: "quiz-app-".to_string(),
            cache_version: format!("v{}", env!("CARGO_PKG_VERSION")),
            precache_manifest: vec![
                "./".to_string(),
                "index.html".to_string(),
                "css/styles.css".to_string(),
                "js/app.js".to_string(),
                "manifest.json".to_string(),
            ],
            fallback_metadata: None,
            store_dir: None,
            dynamic_max_age_days: DEFAULT_DYNAMIC_MAX_AGE_DAYS,
        }
    }
}

impl Config {
    /// Load from disk (defaults if absent), apply environment overrides and
    /// sanitize.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()).sanitized())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `QUIZCACHE_*` overrides from `lookup`.
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("QUIZCACHE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(path) = lookup("QUIZCACHE_DATA_PATH") {
            self.base_data_path = path;
        }
        if let Some(flag) = lookup("QUIZCACHE_CACHE_ENABLED") {
            match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.cache_enabled = true,
                "0" | "false" | "no" | "off" => self.cache_enabled = false,
                other => warn!(value = %other, "Ignoring unrecognized QUIZCACHE_CACHE_ENABLED"),
            }
        }
        if let Some(dir) = lookup("QUIZCACHE_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
        self
    }

    /// Replace out-of-range values by their defaults.
    pub fn sanitized(mut self) -> Self {
        self.metadata_timeout_ms =
            clamp_timeout("metadata_timeout_ms", self.metadata_timeout_ms, DEFAULT_METADATA_TIMEOUT_MS);
        self.quiz_timeout_ms = clamp_timeout("quiz_timeout_ms", self.quiz_timeout_ms, DEFAULT_QUIZ_TIMEOUT_MS);
        self.audio_timeout_ms = clamp_timeout("audio_timeout_ms", self.audio_timeout_ms, DEFAULT_AUDIO_TIMEOUT_MS);

        if self.max_quiz_cache_entries == 0 {
            warn!(default = DEFAULT_QUIZ_CAPACITY, "max_quiz_cache_entries must be positive; using default");
            self.max_quiz_cache_entries = DEFAULT_QUIZ_CAPACITY;
        }
        if !(1..=MAX_DYNAMIC_MAX_AGE_DAYS).contains(&self.dynamic_max_age_days) {
            warn!(
                value = self.dynamic_max_age_days,
                max = MAX_DYNAMIC_MAX_AGE_DAYS,
                default = DEFAULT_DYNAMIC_MAX_AGE_DAYS,
                "dynamic_max_age_days out of range; using default"
            );
            self.dynamic_max_age_days = DEFAULT_DYNAMIC_MAX_AGE_DAYS;
        }
        if !self.base_data_path.is_empty() && !self.base_data_path.ends_with('/') {
            self.base_data_path.push('/');
        }
        self
    }

    /// Application origin, always with a trailing slash.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).with_context(|| format!("Invalid base_url: {}", self.base_url))
    }

    /// Resolve a path under `base_data_path`.
    pub fn data_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url()?;
        base.join(&self.base_data_path)
            .and_then(|data| data.join(path))
            .with_context(|| format!("Invalid data path: {}{}", self.base_data_path, path))
    }

    /// Resolve an asset path relative to the application origin.
    pub fn asset_url(&self, path: &str) -> Result<Url> {
        let base = self.base_url()?;
        base.join(path).with_context(|| format!("Invalid asset path: {}", path))
    }

    pub fn static_store_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.cache_version)
    }

    pub fn dynamic_store_name(&self) -> String {
        format!("{}dynamic", self.cache_prefix)
    }

    pub fn store_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.store_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn quiz_timeout(&self) -> Duration {
        Duration::from_millis(self.quiz_timeout_ms)
    }

    pub fn audio_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_timeout_ms)
    }

    pub fn quiz_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_quiz_cache_entries)
            .or_else(|| NonZeroUsize::new(DEFAULT_QUIZ_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN)
    }

    pub fn dynamic_max_age(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.dynamic_max_age_days)
            .unwrap_or_else(|| chrono::Duration::days(DEFAULT_DYNAMIC_MAX_AGE_DAYS))
    }

    /// Metadata served when every other source failed.
    pub fn fallback_metadata(&self) -> Metadata {
        self.fallback_metadata
            .clone()
            .filter(|m| !m.themes.is_empty())
            .unwrap_or_else(Metadata::builtin_fallback)
    }
}

fn clamp_timeout(name: &str, value: u64, default: u64) -> u64 {
    if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&value) {
        value
    } else {
        warn!(
            setting = name,
            value,
            default,
            min = MIN_TIMEOUT_MS,
            max = MAX_TIMEOUT_MS,
            "Timeout out of range; using default"
        );
        default
    }
}
