//! Cache store.
//!
//! ```text
//! CacheStorage
//!     ├── remc-static-v2   (install-time assets)
//!     └── remc-dynamic-v2  (runtime responses)
//!             └── CacheKey (GET + URL) → CacheEntry
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{HeaderMap, Method, StatusCode};
use remc_common::{RemcError, Result};
use remc_net::{Request, Response, ResponseType};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// Normalized request identity: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: Method::GET,
            url: url.into(),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            ..Self::get(&request.url)
        }
    }

    /// Only GET requests are ever matched or stored.
    pub fn is_cacheable_method(&self) -> bool {
        self.method == Method::GET
    }
}

/// A stored response snapshot.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    pub redirected: bool,
    pub body: Bytes,
    /// Store time (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    pub fn from_response(response: &Response) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            response_type: response.response_type,
            redirected: response.redirected,
            body: response.body().clone(),
            cached_at: now_millis(),
        }
    }

    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.url.clone(), self.status)
            .with_body(self.body.clone())
            .with_type(self.response_type)
            .with_redirected(self.redirected);
        response.headers = self.headers.clone();
        response
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Named caches of request → response snapshots.
///
/// `keys` lists cache names in creation order; `match_any` searches them in
/// that order.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the cache if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Look up `key` in one cache. A missing cache is a miss.
    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store `entry`, creating the cache if needed. Overwrites.
    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<()>;

    /// Drop a whole cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all existing caches.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Look up `key` across every cache.
    async fn match_any(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        for name in self.keys().await? {
            if let Some(entry) = self.get(&name, key).await? {
                trace!(cache = %name, url = %key.url, "Cache hit");
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Store several entries into one cache.
    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, CacheEntry)>) -> Result<()> {
        for (key, entry) in entries {
            self.put(name, key, entry).await?;
        }
        Ok(())
    }
}

/// In-process [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<Vec<(String, HashMap<CacheKey, CacheEntry>)>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage with empty caches already present, in the given order.
    pub fn with_caches<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let caches = names
            .into_iter()
            .map(|name| (name.to_string(), HashMap::new()))
            .collect();
        Self {
            caches: RwLock::new(caches),
        }
    }

    /// Number of entries in `name`, or `None` if the cache does not exist.
    pub async fn len(&self, name: &str) -> Option<usize> {
        let caches = self.caches.read().await;
        caches
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| entries.len())
    }
}

fn slot<'a>(
    caches: &'a mut Vec<(String, HashMap<CacheKey, CacheEntry>)>,
    name: &str,
) -> &'a mut HashMap<CacheKey, CacheEntry> {
    let index = match caches.iter().position(|(n, _)| n == name) {
        Some(index) => index,
        None => {
            debug!(cache = %name, "Creating cache");
            caches.push((name.to_string(), HashMap::new()));
            caches.len() - 1
        }
    };
    &mut caches[index].1
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut caches = self.caches.write().await;
        slot(&mut caches, name);
        Ok(())
    }

    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, entries)| entries.get(key).cloned()))
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<()> {
        if !key.is_cacheable_method() {
            return Err(RemcError::cache(format!(
                "cannot store {} {}",
                key.method, key.url
            )));
        }
        let mut caches = self.caches.write().await;
        slot(&mut caches, name).insert(key, entry);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let caches = self.caches.read().await;
        Ok(caches.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, CacheEntry)>) -> Result<()> {
        if let Some((key, _)) = entries.iter().find(|(k, _)| !k.is_cacheable_method()) {
            return Err(RemcError::cache(format!(
                "cannot store {} {}",
                key.method, key.url
            )));
        }
        // Single write lock: readers never observe a half-filled cache.
        let mut caches = self.caches.write().await;
        slot(&mut caches, name).extend(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &'static str) -> (CacheKey, CacheEntry) {
        let url = Url::parse(url).unwrap();
        let response = Response::new(url.clone(), StatusCode::OK).with_body(body);
        (CacheKey::get(&url), CacheEntry::from_response(&response))
    }

    #[test]
    fn test_key_drops_fragment() {
        let a = CacheKey::get(&Url::parse("https://remc.test/help#faq").unwrap());
        let b = CacheKey::get(&Url::parse("https://remc.test/help").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_keeps_query() {
        let a = CacheKey::get(&Url::parse("https://remc.test/api/stats?x=1").unwrap());
        let b = CacheKey::get(&Url::parse("https://remc.test/api/stats").unwrap());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let storage = MemoryCacheStorage::new();
        let (key, value) = entry("https://remc.test/projects", "projects");

        storage.put("remc-dynamic-v2", key.clone(), value).await.unwrap();
        let hit = storage.get("remc-dynamic-v2", &key).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"projects"));

        assert!(storage.get("remc-static-v2", &key).await.unwrap().is_none());
        assert!(storage.delete("remc-dynamic-v2").await.unwrap());
        assert!(!storage.delete("remc-dynamic-v2").await.unwrap());
        assert!(storage.get("remc-dynamic-v2", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let storage = MemoryCacheStorage::with_caches(["remc-static-v1"]);
        storage.open("remc-static-v2").await.unwrap();
        storage.open("remc-static-v1").await.unwrap();
        let (key, value) = entry("https://remc.test/", "root");
        storage.put("remc-dynamic-v2", key, value).await.unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["remc-static-v1", "remc-static-v2", "remc-dynamic-v2"]
        );
    }

    #[tokio::test]
    async fn test_match_any_prefers_older_cache() {
        let storage = MemoryCacheStorage::new();
        let (key, old) = entry("https://remc.test/help", "static copy");
        let (_, new) = entry("https://remc.test/help", "dynamic copy");
        storage.put("remc-static-v2", key.clone(), old).await.unwrap();
        storage.put("remc-dynamic-v2", key.clone(), new).await.unwrap();

        let hit = storage.match_any(&key).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"static copy"));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let storage = MemoryCacheStorage::new();
        let (key, first) = entry("https://remc.test/api/stats", "1");
        let (_, second) = entry("https://remc.test/api/stats", "2");
        storage.put("d", key.clone(), first).await.unwrap();
        storage.put("d", key.clone(), second).await.unwrap();

        assert_eq!(storage.len("d").await, Some(1));
        let hit = storage.get("d", &key).await.unwrap().unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn test_non_get_rejected() {
        let storage = MemoryCacheStorage::new();
        let (mut key, value) = entry("https://remc.test/share", "ok");
        key.method = Method::POST;

        let result = storage.put("d", key, value).await;
        assert!(matches!(result, Err(RemcError::Cache { .. })));
        assert_eq!(storage.len("d").await, None);
    }

    #[test]
    fn test_entry_round_trips_response_fields() {
        let url = Url::parse("https://cdn.jsdelivr.net/x.css").unwrap();
        let response = Response::new(url, StatusCode::OK)
            .with_body("body{}")
            .with_type(ResponseType::Cors);
        let restored = CacheEntry::from_response(&response).to_response();

        assert_eq!(restored.response_type, ResponseType::Cors);
        assert_eq!(restored.body(), response.body());
        assert_eq!(restored.url, response.url);
    }
}
