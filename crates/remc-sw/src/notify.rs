//! Push notifications, notification clicks and background sync.

use async_trait::async_trait;
use remc_common::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::now_millis;
use crate::clients::{Client, WindowClients};
use crate::config::{NotificationConfig, WorkerConfig};

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// Unique identifier for a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A button on the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// Data attached to the notification for the click handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Push arrival time (ms since epoch).
    pub date_of_arrival: u64,
    pub primary_key: u32,
}

/// Options passed to `showNotification`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

/// A notification on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

/// Incoming push message.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    /// Payload as text, if any.
    pub data: Option<String>,
}

impl PushEvent {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            data: Some(text.into()),
        }
    }
}

/// User interaction with a notification.
#[derive(Debug, Clone)]
pub struct NotificationClickEvent {
    pub notification: Notification,
    /// Action button id; `None` for a click on the body.
    pub action: Option<String>,
}

/// Background sync request.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub tag: String,
}

/// Platform notification display.
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification>;

    /// Returns whether the notification was still displayed.
    async fn close(&self, id: NotificationId) -> Result<bool>;
}

/// In-process notification tray.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    displayed: RwLock<Vec<Notification>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently displayed, oldest first.
    pub async fn displayed(&self) -> Vec<Notification> {
        self.displayed.read().await.clone()
    }
}

#[async_trait]
impl NotificationSurface for NotificationCenter {
    async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification> {
        let notification = Notification {
            id: NotificationId::new(),
            title: title.to_string(),
            options,
        };
        self.displayed.write().await.push(notification.clone());
        Ok(notification)
    }

    async fn close(&self, id: NotificationId) -> Result<bool> {
        let mut displayed = self.displayed.write().await;
        let before = displayed.len();
        displayed.retain(|n| n.id != id);
        Ok(displayed.len() != before)
    }
}

/// Build the notification for a push. An absent or empty payload uses the
/// configured default body.
pub fn push_notification(
    config: &NotificationConfig,
    event: &PushEvent,
    arrived_at: u64,
) -> NotificationOptions {
    let body = event
        .data
        .as_deref()
        .filter(|text| !text.is_empty())
        .unwrap_or(config.default_body.as_str())
        .to_string();

    let action = |id: &str, title: &str| NotificationAction {
        action: id.to_string(),
        title: title.to_string(),
        icon: config.icon.clone(),
    };

    NotificationOptions {
        body,
        icon: config.icon.clone(),
        badge: config.badge.clone(),
        vibrate: config.vibrate.clone(),
        data: NotificationData {
            date_of_arrival: arrived_at,
            primary_key: 1,
        },
        actions: vec![
            action(ACTION_EXPLORE, &config.explore_title),
            action(ACTION_CLOSE, &config.close_title),
        ],
    }
}

/// Display the notification for a push.
pub async fn handle_push(
    config: &WorkerConfig,
    surface: &dyn NotificationSurface,
    event: &PushEvent,
) -> Result<Notification> {
    info!(has_payload = event.data.is_some(), "Push notification received");
    let options = push_notification(&config.notifications, event, now_millis());
    surface.show(&config.notifications.title, options).await
}

/// What a notification click led to.
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    /// Closed, nothing else.
    Closed,
    /// An existing window at the target URL was focused.
    Focused(Client),
    /// A new window was opened.
    Opened(Client),
}

/// Close the notification; on `explore`, focus or open the app window.
pub async fn handle_click(
    config: &WorkerConfig,
    surface: &dyn NotificationSurface,
    clients: &dyn WindowClients,
    event: &NotificationClickEvent,
) -> Result<ClickOutcome> {
    info!(action = ?event.action, "Notification clicked");
    surface.close(event.notification.id).await?;

    if event.action.as_deref() != Some(ACTION_EXPLORE) {
        return Ok(ClickOutcome::Closed);
    }

    let target = config.resolve(&config.notifications.open_path)?;
    let existing = clients
        .match_windows()
        .await
        .into_iter()
        .find(|client| client.url == target);

    match existing {
        Some(client) => {
            debug!(client = %client.id, "Focusing existing window");
            Ok(ClickOutcome::Focused(clients.focus(client.id).await?))
        }
        None => Ok(ClickOutcome::Opened(clients.open_window(&target).await?)),
    }
}

/// Hook run by a `remc-sync` background sync.
#[async_trait]
pub trait DataSync: Send + Sync {
    /// Push locally queued data upstream.
    async fn sync_pending_data(&self) -> Result<()>;
}

/// Sync hook with nothing to sync.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDataSync;

#[async_trait]
impl DataSync for NoopDataSync {
    async fn sync_pending_data(&self) -> Result<()> {
        Ok(())
    }
}

/// Whether a sync event ran the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// Tag did not match; nothing ran.
    Ignored,
}

pub async fn handle_sync(
    config: &WorkerConfig,
    hook: &dyn DataSync,
    event: &SyncEvent,
) -> Result<SyncOutcome> {
    info!(tag = %event.tag, "Background sync triggered");
    if event.tag != config.sync_tag {
        return Ok(SyncOutcome::Ignored);
    }
    hook.sync_pending_data().await?;
    Ok(SyncOutcome::Synced)
}
