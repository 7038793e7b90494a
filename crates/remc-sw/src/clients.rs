//! Window clients: the open app tabs a worker can claim, focus or open.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hashbrown::HashMap;
use remc_common::{OptionExt, RemcError, Result};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Unique identifier for a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A page or worker in the worker's scope.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub url: Url,
    pub client_type: ClientType,
    pub focused: bool,
    /// Whether the active worker intercepts this client's requests.
    pub controlled: bool,
}

/// Clients API as the worker uses it.
#[async_trait]
pub trait WindowClients: Send + Sync {
    /// Take control of every client in scope. Returns how many were newly
    /// claimed.
    async fn claim(&self) -> Result<usize>;

    /// All window clients.
    async fn match_windows(&self) -> Vec<Client>;

    /// Focus an existing window.
    async fn focus(&self, id: ClientId) -> Result<Client>;

    /// Open a new top-level window.
    async fn open_window(&self, url: &Url) -> Result<Client>;
}

/// In-process client registry.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a page that was loaded before any worker was active.
    pub async fn attach(&self, url: Url, client_type: ClientType) -> Client {
        let client = Client {
            id: ClientId::new(),
            url,
            client_type,
            focused: false,
            controlled: false,
        };
        self.clients.write().await.insert(client.id, client.clone());
        client
    }

    pub async fn get(&self, id: ClientId) -> Option<Client> {
        self.clients.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: ClientId) -> Option<Client> {
        self.clients.write().await.remove(&id)
    }
}

#[async_trait]
impl WindowClients for ClientRegistry {
    async fn claim(&self) -> Result<usize> {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        debug!(claimed, "Clients claimed");
        Ok(claimed)
    }

    async fn match_windows(&self) -> Vec<Client> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.client_type == ClientType::Window)
            .cloned()
            .collect()
    }

    async fn focus(&self, id: ClientId) -> Result<Client> {
        let mut clients = self.clients.write().await;
        let client = clients.get(&id).ok_or_not_found(id.to_string())?;
        if client.client_type != ClientType::Window {
            return Err(RemcError::Client(
                "Can only focus window clients".to_string(),
            ));
        }
        for other in clients.values_mut() {
            other.focused = other.id == id;
        }
        clients.get(&id).cloned().ok_or_not_found(id.to_string())
    }

    async fn open_window(&self, url: &Url) -> Result<Client> {
        let mut clients = self.clients.write().await;
        for other in clients.values_mut() {
            other.focused = false;
        }
        let client = Client {
            id: ClientId::new(),
            url: url.clone(),
            client_type: ClientType::Window,
            focused: true,
            controlled: true,
        };
        debug!(client = %client.id, url = %url, "Window opened");
        clients.insert(client.id, client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_open_window() {
        let clients = ClientRegistry::new();
        let client = clients.open_window(&url("https://remc.test/")).await.unwrap();

        assert_eq!(client.client_type, ClientType::Window);
        assert!(client.focused);
        assert!(clients.get(client.id).await.is_some());
    }

    #[tokio::test]
    async fn test_claim_only_counts_new_clients() {
        let clients = ClientRegistry::new();
        clients.attach(url("https://remc.test/projects"), ClientType::Window).await;
        clients.attach(url("https://remc.test/emails"), ClientType::Window).await;

        assert_eq!(clients.claim().await.unwrap(), 2);
        assert_eq!(clients.claim().await.unwrap(), 0);
        assert!(clients.match_windows().await.iter().all(|c| c.controlled));
    }

    #[tokio::test]
    async fn test_focus_moves_focus() {
        let clients = ClientRegistry::new();
        let a = clients.open_window(&url("https://remc.test/")).await.unwrap();
        let b = clients.open_window(&url("https://remc.test/help")).await.unwrap();

        clients.focus(a.id).await.unwrap();
        assert!(clients.get(a.id).await.unwrap().focused);
        assert!(!clients.get(b.id).await.unwrap().focused);
    }

    #[tokio::test]
    async fn test_focus_rejects_workers_and_unknown_ids() {
        let clients = ClientRegistry::new();
        let worker = clients.attach(url("https://remc.test/static/sw.js"), ClientType::Worker).await;

        assert!(matches!(clients.focus(worker.id).await, Err(RemcError::Client(_))));
        clients.remove(worker.id).await;
        assert!(matches!(clients.focus(worker.id).await, Err(RemcError::NotFound(_))));
        assert!(clients.match_windows().await.is_empty());
    }
}
