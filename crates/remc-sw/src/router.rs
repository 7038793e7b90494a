//! Fetch routing.
//!
//! API paths go network-first with a cache fallback. Everything else goes
//! cache-first, filling the dynamic cache from the network on a miss.
//! Cache writes are registered as pending work and never delay or fail the
//! response.

use std::sync::Arc;

use http::StatusCode;
use remc_common::{with_timeout, RemcError, Result};
use remc_net::{Fetcher, Request, Response, ResponseType};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::config::WorkerConfig;
use crate::pending::PendingWork;

/// Retrieval strategy for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStrategy {
    NetworkFirst,
    CacheFirst,
}

/// Pick the strategy by path prefix.
pub fn classify(config: &WorkerConfig, request: &Request) -> RouteStrategy {
    if config.is_api(&request.url) {
        RouteStrategy::NetworkFirst
    } else {
        RouteStrategy::CacheFirst
    }
}

/// Whether a network response may be written to the dynamic cache.
pub fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK
        && response.response_type == ResponseType::Basic
        && !response.redirected
}

/// Where a delivered response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Network,
    Cache,
    /// Cached offline document served for a failed navigation.
    OfflineFallback,
}

/// A response delivered to the page.
#[derive(Debug, Clone)]
pub struct Served {
    pub response: Response,
    pub from: ServedFrom,
}

impl Served {
    fn network(response: Response) -> Self {
        Self {
            response,
            from: ServedFrom::Network,
        }
    }

    fn cached(entry: CacheEntry, from: ServedFrom) -> Self {
        Self {
            response: entry.to_response(),
            from,
        }
    }
}

/// Per-request strategy runner.
#[derive(Clone)]
pub struct Router {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl Router {
    pub fn new(
        config: Arc<WorkerConfig>,
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            caches,
            fetcher,
        }
    }

    /// Answer one intercepted request. `None` is a failed fetch as the
    /// page sees it. Cache writes go to `pending`.
    pub async fn handle_fetch(&self, request: &Request, pending: &PendingWork) -> Option<Served> {
        match classify(&self.config, request) {
            RouteStrategy::NetworkFirst => self.network_first(request, pending).await,
            RouteStrategy::CacheFirst => self.cache_first(request, pending).await,
        }
    }

    async fn network_first(&self, request: &Request, pending: &PendingWork) -> Option<Served> {
        match self.network(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_later(request, &response, pending);
                }
                Some(Served::network(response))
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "Network failed, trying cache");
                self.lookup(&CacheKey::from_request(request))
                    .await
                    .map(|entry| Served::cached(entry, ServedFrom::Cache))
            }
        }
    }

    async fn cache_first(&self, request: &Request, pending: &PendingWork) -> Option<Served> {
        if let Some(entry) = self.lookup(&CacheKey::from_request(request)).await {
            debug!(url = %request.url, "Serving from cache");
            return Some(Served::cached(entry, ServedFrom::Cache));
        }

        debug!(url = %request.url, "Fetching from network");
        match self.network(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_later(request, &response, pending);
                } else {
                    debug!(
                        url = %request.url,
                        status = %response.status,
                        response_type = %response.response_type,
                        "Not caching response"
                    );
                }
                Some(Served::network(response))
            }
            Err(err) => {
                warn!(url = %request.url, error = %err, "Fetch failed");
                if !request.is_navigation() {
                    return None;
                }
                let fallback = self.config.resolve(&self.config.offline_document).ok()?;
                self.lookup(&CacheKey::get(&fallback))
                    .await
                    .map(|entry| Served::cached(entry, ServedFrom::OfflineFallback))
            }
        }
    }

    async fn network(&self, request: &Request) -> Result<Response> {
        with_timeout(self.config.network_timeout(), self.fetcher.fetch(request))
            .await?
            .map_err(RemcError::from)
    }

    /// Cross-cache lookup. Store errors count as a miss.
    async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !key.is_cacheable_method() {
            return None;
        }
        match self.caches.match_any(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(url = %key.url, error = %err, "Cache lookup failed");
                None
            }
        }
    }

    fn store_later(&self, request: &Request, response: &Response, pending: &PendingWork) {
        let key = CacheKey::from_request(request);
        if !key.is_cacheable_method() {
            return;
        }
        let entry = CacheEntry::from_response(response);
        let caches = Arc::clone(&self.caches);
        let cache_name = self.config.dynamic_cache_name();

        pending.wait_until(async move {
            if let Err(err) = caches.put(&cache_name, key.clone(), entry).await {
                warn!(cache = %cache_name, url = %key.url, error = %err, "Cache write failed");
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    fn request(path: &str) -> Request {
        Request::get(Url::parse("http://localhost:5000/").unwrap().join(path).unwrap())
    }

    #[test]
    fn test_classify() {
        let config = WorkerConfig::default();
        assert_eq!(classify(&config, &request("/api/stats")), RouteStrategy::NetworkFirst);
        assert_eq!(
            classify(&config, &request("/api/projects/search?q=a")),
            RouteStrategy::NetworkFirst
        );
        assert_eq!(classify(&config, &request("/projects")), RouteStrategy::CacheFirst);
        assert_eq!(classify(&config, &request("/api")), RouteStrategy::CacheFirst);
        assert_eq!(
            classify(&config, &request("/static/manifest.json")),
            RouteStrategy::CacheFirst
        );
        assert_eq!(
            classify(&config, &request("/api/stats").method(Method::POST)),
            RouteStrategy::NetworkFirst
        );
    }

    #[test]
    fn test_is_cacheable() {
        let url = Url::parse("http://localhost:5000/help").unwrap();
        let ok = Response::new(url.clone(), StatusCode::OK);
        assert!(is_cacheable(&ok));

        assert!(!is_cacheable(&Response::new(url.clone(), StatusCode::NOT_FOUND)));
        assert!(!is_cacheable(&Response::new(url.clone(), StatusCode::NO_CONTENT)));
        assert!(!is_cacheable(&ok.clone().with_type(ResponseType::Cors)));
        assert!(!is_cacheable(&ok.clone().with_type(ResponseType::Opaque)));
        assert!(!is_cacheable(&ok.with_redirected(true)));
    }
}
