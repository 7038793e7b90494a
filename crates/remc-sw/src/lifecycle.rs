//! Install and activate.
//!
//! ```text
//! parsed → installing → installed (waiting) → activating → activated
//!              │                                               │
//!              └──────── install failed ──→ redundant ←── superseded
//! ```

use futures::future::try_join_all;
use remc_common::{with_timeout, RemcError, Result};
use remc_net::{Fetcher, Request};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::clients::WindowClients;
use crate::config::WorkerConfig;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to take over.
    Installed,
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Install failed or replaced by a newer worker.
    Redundant,
}

impl WorkerState {
    /// Only an activated worker intercepts fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub cache_name: String,
    /// Number of assets written.
    pub cached: usize,
    /// Activate without waiting for old clients to close.
    pub skip_waiting: bool,
}

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
    /// Stale cache names that were deleted.
    pub deleted: Vec<String>,
    /// Clients newly taken over.
    pub claimed: usize,
}

/// Pre-cache the static asset list into the static generation.
///
/// Every asset is fetched before anything is written. A transport failure
/// or a non-2xx status on any asset fails the install and leaves the
/// static cache untouched.
pub async fn install(
    config: &WorkerConfig,
    caches: &dyn CacheStorage,
    fetcher: &dyn Fetcher,
) -> Result<InstallOutcome> {
    let cache_name = config.static_cache_name();
    info!(cache = %cache_name, assets = config.static_assets.len(), "Installing");

    let assets = config.resolve_assets()?;
    let fetched = try_join_all(
        assets
            .into_iter()
            .map(|url| fetch_asset(config, fetcher, url)),
    )
    .await?;

    let existed = caches.keys().await?.contains(&cache_name);
    caches.open(&cache_name).await?;

    debug!(cache = %cache_name, "Caching app shell");
    let cached = fetched.len();
    if let Err(err) = caches.put_all(&cache_name, fetched).await {
        if !existed {
            // A partially written generation must not survive a failed install.
            if let Err(cleanup) = caches.delete(&cache_name).await {
                warn!(cache = %cache_name, error = %cleanup, "Failed to drop partial cache");
            }
        }
        return Err(RemcError::install_with_source(
            format!("writing {cache_name} failed"),
            err,
        ));
    }

    info!(cache = %cache_name, cached, "Installed successfully");
    Ok(InstallOutcome {
        cache_name,
        cached,
        skip_waiting: true,
    })
}

async fn fetch_asset(
    config: &WorkerConfig,
    fetcher: &dyn Fetcher,
    url: Url,
) -> Result<(CacheKey, CacheEntry)> {
    let request = Request::get(url);
    let response = with_timeout(config.network_timeout(), fetcher.fetch(&request))
        .await
        .map_err(|e| RemcError::install_with_source(request.url.to_string(), e))?
        .map_err(|e| RemcError::install_with_source(request.url.to_string(), e))?;

    if !response.ok() {
        warn!(url = %request.url, status = %response.status, "Asset not cacheable");
        return Err(RemcError::install(format!(
            "{} returned {}",
            request.url, response.status
        )));
    }

    Ok((
        CacheKey::from_request(&request),
        CacheEntry::from_response(&response),
    ))
}

/// Delete every cache that is not one of the current two generations, then
/// claim all clients.
pub async fn activate(
    config: &WorkerConfig,
    caches: &dyn CacheStorage,
    clients: &dyn WindowClients,
) -> Result<ActivateOutcome> {
    info!(version = %config.version, "Activating");

    let stale: Vec<String> = caches
        .keys()
        .await?
        .into_iter()
        .filter(|name| !config.is_current_cache(name))
        .collect();

    try_join_all(stale.iter().map(|name| async move {
        info!(cache = %name, "Deleting old cache");
        caches.delete(name).await
    }))
    .await?;

    let claimed = clients.claim().await?;
    info!(deleted = stale.len(), claimed, "Activated successfully");

    Ok(ActivateOutcome {
        deleted: stale,
        claimed,
    })
}
