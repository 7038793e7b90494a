//! Event dispatch for one worker generation.
//!
//! [`ServiceWorker::dispatch`] maps each [`WorkerEvent`] to its handler and
//! hands back a [`Dispatch`]: the response future (fetch only) and the
//! [`PendingWork`] the host must settle before the event counts as handled.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use remc_common::Result;
use remc_net::{Fetcher, Request};
use tokio::sync::oneshot;
use tracing::debug;

use crate::cache::CacheStorage;
use crate::clients::{ClientRegistry, WindowClients};
use crate::config::WorkerConfig;
use crate::lifecycle::{self, ActivateOutcome, InstallOutcome};
use crate::notify::{
    self, ClickOutcome, DataSync, NoopDataSync, Notification, NotificationCenter,
    NotificationClickEvent, NotificationSurface, PushEvent, SyncEvent, SyncOutcome,
};
use crate::pending::PendingWork;
use crate::router::{Router, Served};

/// Events delivered to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushEvent),
    NotificationClick(NotificationClickEvent),
    Sync(SyncEvent),
}

/// Event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
    Sync,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
            EventKind::Sync => "sync",
        }
    }
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
            WorkerEvent::Sync(_) => EventKind::Sync,
        }
    }
}

/// What a non-fetch event's pending work produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallOutcome),
    Activated(ActivateOutcome),
    Notified(Notification),
    Clicked(ClickOutcome),
    Synced(SyncOutcome),
}

/// Response future of a fetch event. `None` is a failed fetch.
pub type ResponseFuture = BoxFuture<'static, Option<Served>>;

/// A dispatched event, not yet run.
pub struct Dispatch {
    pub kind: EventKind,
    /// Set for fetch events only.
    pub respond_with: Option<ResponseFuture>,
    pub wait_until: PendingWork,
    outcome: Option<oneshot::Receiver<EventOutcome>>,
}

/// A dispatched event after it ran to completion.
#[derive(Debug)]
pub struct Completed {
    pub response: Option<Served>,
    pub outcome: Option<EventOutcome>,
}

impl Dispatch {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            respond_with: None,
            wait_until: PendingWork::new(),
            outcome: None,
        }
    }

    /// Register `work` as the event's pending work; its value becomes the
    /// event outcome.
    fn track<F>(mut self, work: F) -> Self
    where
        F: std::future::Future<Output = Result<EventOutcome>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.wait_until.wait_until(async move {
            let outcome = work.await?;
            let _ = tx.send(outcome);
            Ok(())
        });
        self.outcome = Some(rx);
        self
    }

    /// Await the response (if any), then all pending work. Errors from
    /// pending work surface here.
    pub async fn complete(self) -> Result<Completed> {
        let response = match self.respond_with {
            Some(response) => response.await,
            None => None,
        };
        self.wait_until.settle().await?;
        let outcome = match self.outcome {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        Ok(Completed { response, outcome })
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("kind", &self.kind)
            .field("respond_with", &self.respond_with.is_some())
            .field("wait_until", &self.wait_until)
            .finish()
    }
}

/// One worker generation and the platform services it talks to.
#[derive(Clone)]
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn WindowClients>,
    notifications: Arc<dyn NotificationSurface>,
    data_sync: Arc<dyn DataSync>,
}

impl ServiceWorker {
    /// Worker with in-process clients, notification tray and a no-op sync
    /// hook.
    pub fn new(
        config: Arc<WorkerConfig>,
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            caches,
            fetcher,
            clients: Arc::new(ClientRegistry::new()),
            notifications: Arc::new(NotificationCenter::new()),
            data_sync: Arc::new(NoopDataSync),
        }
    }

    pub fn with_clients(mut self, clients: Arc<dyn WindowClients>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSurface>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_data_sync(mut self, data_sync: Arc<dyn DataSync>) -> Self {
        self.data_sync = data_sync;
        self
    }

    pub fn config(&self) -> &Arc<WorkerConfig> {
        &self.config
    }

    /// Route an event to its handler. Nothing runs until the returned
    /// futures are polled.
    pub fn dispatch(&self, event: WorkerEvent) -> Dispatch {
        let kind = event.kind();
        debug!(event = kind.as_str(), version = %self.config.version, "Dispatching");
        let dispatch = Dispatch::new(kind);
        let worker = self.clone();

        match event {
            WorkerEvent::Install => dispatch.track(async move {
                lifecycle::install(&worker.config, worker.caches.as_ref(), worker.fetcher.as_ref())
                    .await
                    .map(EventOutcome::Installed)
            }),
            WorkerEvent::Activate => dispatch.track(async move {
                lifecycle::activate(&worker.config, worker.caches.as_ref(), worker.clients.as_ref())
                    .await
                    .map(EventOutcome::Activated)
            }),
            WorkerEvent::Fetch(request) => {
                let mut dispatch = dispatch;
                let pending = dispatch.wait_until.clone();
                let router = Router::new(
                    Arc::clone(&worker.config),
                    Arc::clone(&worker.caches),
                    Arc::clone(&worker.fetcher),
                );
                dispatch.respond_with =
                    Some(async move { router.handle_fetch(&request, &pending).await }.boxed());
                dispatch
            }
            WorkerEvent::Push(push) => dispatch.track(async move {
                notify::handle_push(&worker.config, worker.notifications.as_ref(), &push)
                    .await
                    .map(EventOutcome::Notified)
            }),
            WorkerEvent::NotificationClick(click) => dispatch.track(async move {
                notify::handle_click(
                    &worker.config,
                    worker.notifications.as_ref(),
                    worker.clients.as_ref(),
                    &click,
                )
                .await
                .map(EventOutcome::Clicked)
            }),
            WorkerEvent::Sync(sync) => dispatch.track(async move {
                notify::handle_sync(&worker.config, worker.data_sync.as_ref(), &sync)
                    .await
                    .map(EventOutcome::Synced)
            }),
        }
    }
}
