//! Install and activate against a scripted network.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{config, config_version, seed, url, ScriptedNetwork};
use remc_common::RemcError;
use remc_net::{Destination, Request};
use remc_sw::lifecycle::{activate, install};
use remc_sw::{
    CacheKey, CacheStorage, ClientRegistry, ClientType, MemoryCacheStorage, PendingWork, Router,
    ServedFrom, WorkerConfig, DEFAULT_STATIC_ASSETS,
};

#[tokio::test]
async fn install_caches_every_static_asset() {
    let caches = MemoryCacheStorage::new();
    let net = ScriptedNetwork::with_app_shell();
    let config = config();

    let outcome = install(&config, &caches, &net).await.unwrap();

    assert_eq!(outcome.cache_name, "remc-static-v2");
    assert_eq!(outcome.cached, DEFAULT_STATIC_ASSETS.len());
    assert!(outcome.skip_waiting);
    assert_eq!(
        caches.len("remc-static-v2").await,
        Some(DEFAULT_STATIC_ASSETS.len())
    );
    for asset in DEFAULT_STATIC_ASSETS {
        assert_eq!(net.calls(asset), 1, "{asset} fetched once");
        let entry = caches
            .get("remc-static-v2", &CacheKey::get(&url(asset)))
            .await
            .unwrap();
        assert!(entry.is_some(), "{asset} cached");
    }
}

#[tokio::test]
async fn installed_assets_are_served_offline_unchanged() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let net = Arc::new(ScriptedNetwork::with_app_shell());
    let config = Arc::new(config());
    install(&config, caches.as_ref(), net.as_ref()).await.unwrap();

    net.set_offline(true);
    net.reset_calls();
    let router = Router::new(config, caches, net.clone());

    for asset in DEFAULT_STATIC_ASSETS {
        let served = router
            .handle_fetch(&Request::get(url(asset)), &PendingWork::new())
            .await
            .unwrap();
        assert_eq!(served.from, ServedFrom::Cache);
        assert_eq!(
            served.response.text().unwrap(),
            format!("asset:{}", url(asset))
        );
    }
    assert_eq!(net.total_calls(), 0);
}

#[tokio::test]
async fn installed_root_is_the_offline_page() {
    let caches = Arc::new(MemoryCacheStorage::new());
    let net = Arc::new(ScriptedNetwork::with_app_shell());
    let config = Arc::new(config());
    install(&config, caches.as_ref(), net.as_ref()).await.unwrap();
    net.set_offline(true);

    let served = Router::new(config, caches, net)
        .handle_fetch(
            &Request::navigate(url("/project/123")).destination(Destination::Document),
            &PendingWork::new(),
        )
        .await
        .unwrap();

    assert_eq!(served.from, ServedFrom::OfflineFallback);
    assert_eq!(served.response.text().unwrap(), format!("asset:{}", url("/")));
}

#[tokio::test]
async fn install_fails_when_one_asset_is_missing() {
    let caches = MemoryCacheStorage::new();
    let net = ScriptedNetwork::new();
    net.serve("/", 200, "<h1>REMC</h1>");
    net.serve("/static/manifest.json", 404, "");
    let config = WorkerConfig {
        static_assets: vec!["/".to_string(), "/static/manifest.json".to_string()],
        ..config()
    };

    let result = install(&config, &caches, &net).await;

    assert!(matches!(result, Err(RemcError::Install { .. })));
    assert!(caches.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn install_fails_on_transport_error() {
    let caches = MemoryCacheStorage::new();
    let net = ScriptedNetwork::with_app_shell();
    net.fail("/static/sw.js");

    let result = install(&config(), &caches, &net).await;

    assert!(matches!(result, Err(RemcError::Install { .. })));
    assert_eq!(net.calls("/static/sw.js"), 1);
    assert!(caches.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn install_fails_when_an_asset_misses_the_deadline() {
    let caches = MemoryCacheStorage::new();
    let net = ScriptedNetwork::with_app_shell();
    net.set_latency(Duration::from_millis(500));
    let config = WorkerConfig {
        network_timeout_ms: Some(20),
        ..config()
    };

    let result = install(&config, &caches, &net).await;

    assert!(matches!(result, Err(RemcError::Install { .. })));
    assert!(caches.keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn activate_deletes_only_stale_generations() {
    let caches =
        MemoryCacheStorage::with_caches(["remc-static-v1", "remc-static-v2", "remc-dynamic-v2"]);
    let clients = ClientRegistry::new();

    let outcome = activate(&config(), &caches, &clients).await.unwrap();

    assert_eq!(outcome.deleted, vec!["remc-static-v1".to_string()]);
    assert_eq!(
        caches.keys().await.unwrap(),
        vec!["remc-static-v2".to_string(), "remc-dynamic-v2".to_string()]
    );

    let again = activate(&config(), &caches, &clients).await.unwrap();
    assert!(again.deleted.is_empty());
    assert_eq!(caches.keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn activate_deletes_foreign_caches_too() {
    let caches = MemoryCacheStorage::with_caches(["remc-dynamic-v1", "other-app", "remc-static-v3"]);

    let outcome = activate(&config_version("v3"), &caches, &ClientRegistry::new())
        .await
        .unwrap();

    assert_eq!(outcome.deleted.len(), 2);
    assert_eq!(caches.keys().await.unwrap(), vec!["remc-static-v3".to_string()]);
}

#[tokio::test]
async fn activate_claims_open_windows() {
    let caches = MemoryCacheStorage::new();
    let clients = ClientRegistry::new();
    let home = clients.attach(url("/"), ClientType::Window).await;
    let help = clients.attach(url("/help"), ClientType::Window).await;

    let outcome = activate(&config(), &caches, &clients).await.unwrap();

    assert_eq!(outcome.claimed, 2);
    assert!(clients.get(home.id).await.unwrap().controlled);
    assert!(clients.get(help.id).await.unwrap().controlled);

    let again = activate(&config(), &caches, &clients).await.unwrap();
    assert_eq!(again.claimed, 0);
}

#[tokio::test]
async fn upgrade_keeps_dynamic_entries_of_new_generation_only() {
    let caches = MemoryCacheStorage::new();
    seed(&caches, "remc-dynamic-v2", "/api/stats", "v2 stats").await;
    let net = ScriptedNetwork::with_app_shell();
    let v3 = config_version("v3");

    install(&v3, &caches, &net).await.unwrap();
    activate(&v3, &caches, &ClientRegistry::new()).await.unwrap();

    assert_eq!(caches.keys().await.unwrap(), vec!["remc-static-v3".to_string()]);
    let stale = caches
        .match_any(&CacheKey::get(&url("/api/stats")))
        .await
        .unwrap();
    assert!(stale.is_none());
}
