//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use remc_common::{RemcError, Result};
use remc_net::{Fetcher, NetError, Request, Response, ResponseType};
use remc_sw::{CacheEntry, CacheKey, CacheStorage, MemoryCacheStorage, WorkerConfig};
use url::Url;

pub const ORIGIN: &str = "https://remc.test/";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(location: &str) -> Url {
    origin().join(location).unwrap()
}

pub fn config() -> WorkerConfig {
    WorkerConfig::for_origin(origin())
}

pub fn config_version(version: &str) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        ..config()
    }
}

enum Route {
    Respond {
        status: StatusCode,
        body: String,
        response_type: Option<ResponseType>,
    },
    Fail,
}

/// Network that answers from a script and counts calls per URL.
pub struct ScriptedNetwork {
    origin: Url,
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self {
            origin: origin(),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Network serving every default static asset with body `asset:<url>`.
    pub fn with_app_shell() -> Self {
        let net = Self::new();
        for asset in config().resolve_assets().unwrap() {
            net.serve(asset.as_str(), 200, &format!("asset:{asset}"));
        }
        net
    }

    fn key(&self, location: &str) -> String {
        let mut url = self.origin.join(location).unwrap();
        url.set_fragment(None);
        url.into()
    }

    pub fn serve(&self, location: &str, status: u16, body: &str) {
        self.routes.lock().unwrap().insert(
            self.key(location),
            Route::Respond {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                response_type: None,
            },
        );
    }

    pub fn serve_typed(&self, location: &str, body: &str, response_type: ResponseType) {
        self.routes.lock().unwrap().insert(
            self.key(location),
            Route::Respond {
                status: StatusCode::OK,
                body: body.to_string(),
                response_type: Some(response_type),
            },
        );
    }

    /// Transport failure for one URL.
    pub fn fail(&self, location: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(self.key(location), Route::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every round-trip by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self, location: &str) -> usize {
        let key = self.key(location);
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
        let key = self.key(request.url.as_str());
        *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline(key));
        }

        let routes = self.routes.lock().unwrap();
        let url = Url::parse(&key).unwrap();
        match routes.get(&key) {
            Some(Route::Fail) => Err(NetError::RequestFailed(key)),
            Some(Route::Respond {
                status,
                body,
                response_type,
            }) => {
                let response_type =
                    response_type.unwrap_or_else(|| ResponseType::classify(&self.origin, &url));
                Ok(Response::new(url, *status)
                    .with_body(body.clone())
                    .with_type(response_type))
            }
            None => Ok(Response::new(url, StatusCode::NOT_FOUND)),
        }
    }
}

/// Cache store whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyCache {
    pub inner: MemoryCacheStorage,
}

#[async_trait]
impl CacheStorage for ReadOnlyCache {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.inner.get(name, key).await
    }

    async fn put(&self, _name: &str, _key: CacheKey, _entry: CacheEntry) -> Result<()> {
        Err(RemcError::cache("quota exceeded"))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }
}

/// Put a response body straight into a cache.
pub async fn seed(caches: &dyn CacheStorage, cache: &str, location: &str, body: &str) {
    let url = url(location);
    let response = Response::new(url.clone(), StatusCode::OK).with_body(body.to_string());
    caches
        .put(cache, CacheKey::get(&url), CacheEntry::from_response(&response))
        .await
        .unwrap();
}
