//! Worker configuration.
//!
//! One immutable [`WorkerConfig`] per worker generation. It is shared by
//! `Arc` between the lifecycle, router and notification code; nothing
//! mutates it after construction.

use std::path::Path;
use std::time::Duration;

use remc_common::{RemcError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Origin of a local REMC development server.
pub const DEFAULT_ORIGIN: &str = "http://localhost:5000/";

/// Install-time asset list of the REMC app.
pub const DEFAULT_STATIC_ASSETS: &[&str] = &[
    "/",
    "/projects",
    "/emails",
    "/help",
    "/settings",
    "/install",
    "/static/manifest.json",
    "/static/icon-192.svg",
    "/static/sw.js",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
];

/// Configuration of one worker generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered for. Relative assets resolve
    /// against it and responses from it count as same-origin.
    pub origin: Url,

    /// Generation tag. Bumping it is the only way to invalidate caches.
    pub version: String,

    /// Cache name prefix (`<prefix>-static-<version>`).
    pub cache_prefix: String,

    /// Requests whose path starts with this go network-first.
    pub api_prefix: String,

    /// Pre-cached at install; all-or-nothing.
    pub static_assets: Vec<String>,

    /// Served to failed navigations when it is cached.
    pub offline_document: String,

    /// Background sync tag that triggers the data sync hook.
    pub sync_tag: String,

    /// Deadline for one network round-trip, in milliseconds. `None`
    /// leaves it to the fetcher.
    pub network_timeout_ms: Option<u64>,

    pub notifications: NotificationConfig,
}

/// Push notification appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,

    /// Body used when a push arrives without payload text.
    pub default_body: String,

    pub icon: String,
    pub badge: String,

    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,

    /// Title of the `explore` action button.
    pub explore_title: String,

    /// Title of the `close` action button.
    pub close_title: String,

    /// Window opened or focused by the `explore` action.
    pub open_path: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            version: "v2".to_string(),
            cache_prefix: "remc".to_string(),
            api_prefix: "/api/".to_string(),
            static_assets: DEFAULT_STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
            offline_document: "/".to_string(),
            sync_tag: "remc-sync".to_string(),
            network_timeout_ms: None,
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "REMC".to_string(),
            default_body: "New REMC notification".to_string(),
            icon: "/static/icon-192.svg".to_string(),
            badge: "/static/icon-192.svg".to_string(),
            vibrate: vec![200, 100, 200],
            explore_title: "Open REMC".to_string(),
            close_title: "Close".to_string(),
            open_path: "/".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Default configuration served from `origin`.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RemcError::config_with_source("invalid worker config JSON", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RemcError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json_str(&json)
    }

    /// Reject configurations the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(RemcError::config(format!(
                "origin must be http(s), got `{}`",
                self.origin
            )));
        }
        if self.version.trim().is_empty() {
            return Err(RemcError::config("version must not be empty"));
        }
        if self.cache_prefix.trim().is_empty() {
            return Err(RemcError::config("cache_prefix must not be empty"));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(RemcError::config(format!(
                "api_prefix must start with `/`, got `{}`",
                self.api_prefix
            )));
        }
        self.resolve_assets()?;
        self.resolve(&self.offline_document)?;
        self.resolve(&self.notifications.open_path)?;
        Ok(())
    }

    /// Name of the pre-cached generation.
    pub fn static_cache_name(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.version)
    }

    /// Name of the runtime-cached generation.
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.version)
    }

    /// Whether `name` is one of this generation's two caches.
    pub fn is_current_cache(&self, name: &str) -> bool {
        name == self.static_cache_name() || name == self.dynamic_cache_name()
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve a path or absolute URL against the origin.
    pub fn resolve(&self, location: &str) -> Result<Url> {
        self.origin.join(location).map_err(|e| {
            RemcError::config_with_source(format!("cannot resolve `{location}`"), e)
        })
    }

    /// The static asset list as absolute URLs, in declared order.
    pub fn resolve_assets(&self) -> Result<Vec<Url>> {
        self.static_assets.iter().map(|a| self.resolve(a)).collect()
    }

    /// Whether `url` is routed network-first.
    pub fn is_api(&self, url: &Url) -> bool {
        url.path().starts_with(&self.api_prefix)
    }
}

fn default_origin() -> Url {
    // DEFAULT_ORIGIN is a literal absolute URL; parsing cannot fail.
    Url::parse(DEFAULT_ORIGIN).unwrap_or_else(|e| unreachable!("{DEFAULT_ORIGIN}: {e}"))
}
