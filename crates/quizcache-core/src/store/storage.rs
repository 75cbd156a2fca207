use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::net::{Request, Response, ResponseKind};

use super::StoreError;

/// Extension of entry files inside a store directory.
const ENTRY_EXTENSION: &str = "json";

/// A response as kept in a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(serialize_with = "serialize_body", deserialize_with = "deserialize_body")]
    pub body: Bytes,
    pub kind: ResponseKind,
}

impl StoredResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl From<&Response> for StoredResponse {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            kind: response.kind,
        }
    }
}

impl From<StoredResponse> for Response {
    fn from(stored: StoredResponse) -> Self {
        Response::new(stored.status, stored.headers, stored.body, stored.kind)
    }
}

fn serialize_body<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(body))
}

fn deserialize_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
        .decode(encoded.as_bytes())
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}

/// On-disk form of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct EntryFile {
    key: String,
    response: StoredResponse,
}

/// One named store.
pub struct CacheStore {
    name: String,
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<String, StoredResponse>>,
}

impl CacheStore {
    fn new(name: String, dir: Option<PathBuf>, entries: HashMap<String, StoredResponse>) -> Self {
        Self {
            name,
            dir,
            entries: RwLock::new(entries),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| {
            let digest = hex::encode(Sha256::digest(key.as_bytes()));
            dir.join(format!("{}.{}", digest, ENTRY_EXTENSION))
        })
    }

    /// Stored response for a request, if any.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        self.match_key(&request.cache_key()).await.map(Response::from)
    }

    pub async fn match_key(&self, key: &str) -> Option<StoredResponse> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn contains(&self, request: &Request) -> bool {
        self.entries.read().await.contains_key(&request.cache_key())
    }

    /// Store a response under the request's key. Last write wins.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), StoreError> {
        let key = request.cache_key();
        let stored = StoredResponse::from(response);

        if let Some(path) = self.entry_path(&key) {
            let file = EntryFile {
                key: key.clone(),
                response: stored.clone(),
            };
            tokio::fs::write(&path, serde_json::to_vec(&file)?).await?;
        }

        debug!(store = %self.name, key = %key, "Stored response");
        self.entries.write().await.insert(key, stored);
        Ok(())
    }

    /// Delete one entry. Returns whether it existed.
    pub async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let existed = self.entries.write().await.remove(key).is_some();
        if existed {
            if let Some(path) = self.entry_path(key) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(existed)
    }

    /// Snapshot of every entry.
    pub async fn entries(&self) -> Vec<(String, StoredResponse)> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn load_dir(dir: &Path) -> Result<HashMap<String, StoredResponse>, StoreError> {
        let mut entries = HashMap::new();
        let mut reader = tokio::fs::read_dir(dir).await?;
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(StoreError::from)
                .and_then(|raw| serde_json::from_slice::<EntryFile>(&raw).map_err(StoreError::from));
            match parsed {
                Ok(file) => {
                    entries.insert(file.key, file.response);
                }
                Err(e) => {
                    // An unreadable entry is a cache miss, not a startup failure
                    warn!(path = %path.display(), error = %e, "Skipping unreadable store entry");
                }
            }
        }
        Ok(entries)
    }
}

/// All named stores of the application.
pub struct CacheStorage {
    root: Option<PathBuf>,
    stores: RwLock<HashMap<String, Arc<CacheStore>>>,
}

impl CacheStorage {
    /// Stores that live only as long as this value.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Open (creating if needed) a directory-backed storage and load every
    /// store found in it.
    pub async fn open_dir(root: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&root).await?;

        let mut stores = HashMap::new();
        let mut reader = tokio::fs::read_dir(&root).await?;
        while let Some(item) = reader.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = item.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let dir = item.path();
            let entries = CacheStore::load_dir(&dir).await?;
            debug!(store = %name, entries = entries.len(), "Loaded persistent store");
            stores.insert(name.clone(), Arc::new(CacheStore::new(name, Some(dir), entries)));
        }

        Ok(Self {
            root: Some(root),
            stores: RwLock::new(stores),
        })
    }

    fn validate_name(name: &str) -> Result<(), StoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && name != "."
            && name != "..";
        if valid {
            Ok(())
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }

    /// Open a store, creating an empty one if it does not exist.
    pub async fn open(&self, name: &str) -> Result<Arc<CacheStore>, StoreError> {
        if let Some(store) = self.stores.read().await.get(name) {
            return Ok(Arc::clone(store));
        }
        Self::validate_name(name)?;

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        let dir = match &self.root {
            Some(root) => {
                let dir = root.join(name);
                tokio::fs::create_dir_all(&dir).await?;
                Some(dir)
            }
            None => None,
        };
        let store = Arc::new(CacheStore::new(name.to_string(), dir, HashMap::new()));
        stores.insert(name.to_string(), Arc::clone(&store));
        debug!(store = %name, "Opened new store");
        Ok(store)
    }

    /// An existing store, without creating one.
    pub async fn get(&self, name: &str) -> Option<Arc<CacheStore>> {
        self.stores.read().await.get(name).cloned()
    }

    pub async fn has(&self, name: &str) -> bool {
        self.stores.read().await.contains_key(name)
    }

    /// Names of all stores, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Delete a store and all its entries. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.stores.write().await.remove(name);
        let Some(store) = removed else {
            return Ok(false);
        };
        if let Some(ref dir) = store.dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(store = %name, "Deleted store");
        Ok(true)
    }
}
