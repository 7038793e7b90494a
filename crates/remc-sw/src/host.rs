//! The registration a browser keeps for the worker: which generation is
//! installing, waiting and active, and the event loop that feeds them.
//!
//! ```text
//! WorkerHost
//!     ├── installing (WorkerSlot)
//!     ├── waiting    (WorkerSlot)
//!     ├── active     (WorkerSlot)  ← fetches go here
//!     └── background (JoinSet)     ← cache writes outliving a fetch
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use remc_common::{RemcError, Result};
use remc_net::{Fetcher, Request};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::cache::CacheStorage;
use crate::clients::{ClientRegistry, WindowClients};
use crate::config::WorkerConfig;
use crate::lifecycle::WorkerState;
use crate::notify::{NotificationCenter, NotificationSurface};
use crate::router::{Served, ServedFrom};
use crate::worker::{Completed, EventKind, EventOutcome, ServiceWorker, WorkerEvent};

/// Unique identifier for a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Public view of a worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub version: String,
    pub state: WorkerState,
}

/// Registration state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A new generation started installing.
    UpdateFound { worker_id: WorkerId },
    StateChange {
        worker_id: WorkerId,
        new_state: WorkerState,
    },
    /// Clients are now controlled by this worker.
    ControllerChange { worker_id: WorkerId },
}

fn flatten(finished: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    finished.map_err(|e| RemcError::internal(format!("background task failed: {e}")))?
}

struct WorkerSlot {
    id: WorkerId,
    state: WorkerState,
    worker: ServiceWorker,
}

impl WorkerSlot {
    fn info(&self) -> WorkerInfo {
        WorkerInfo {
            id: self.id,
            version: self.worker.config().version.clone(),
            state: self.state,
        }
    }
}

#[derive(Default)]
struct Registration {
    installing: Option<WorkerSlot>,
    waiting: Option<WorkerSlot>,
    active: Option<WorkerSlot>,
}

/// Drives worker generations through their lifecycle and feeds them events.
pub struct WorkerHost {
    registration: Arc<RwLock<Registration>>,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn WindowClients>,
    notifications: Arc<dyn NotificationSurface>,
    background: Mutex<JoinSet<Result<()>>>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
}

impl WorkerHost {
    /// Create a host over a cache store and network.
    pub fn new(
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<HostEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                registration: Arc::new(RwLock::new(Registration::default())),
                caches,
                fetcher,
                clients: Arc::new(ClientRegistry::new()),
                notifications: Arc::new(NotificationCenter::new()),
                background: Mutex::new(JoinSet::new()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn with_clients(mut self, clients: Arc<dyn WindowClients>) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationSurface>) -> Self {
        self.notifications = notifications;
        self
    }

    fn emit(&self, event: HostEvent) {
        let _ = self.event_tx.send(event);
    }

    fn set_state(&self, slot: &mut WorkerSlot, state: WorkerState) {
        slot.state = state;
        self.emit(HostEvent::StateChange {
            worker_id: slot.id,
            new_state: state,
        });
    }

    /// Install a new generation from `config` and, when it asks to skip
    /// waiting, activate it. On install failure the new generation becomes
    /// redundant and the active one keeps serving.
    pub async fn register(&self, config: WorkerConfig) -> Result<WorkerId> {
        config.validate()?;
        let worker = ServiceWorker::new(
            Arc::new(config),
            Arc::clone(&self.caches),
            Arc::clone(&self.fetcher),
        )
        .with_clients(Arc::clone(&self.clients))
        .with_notifications(Arc::clone(&self.notifications));

        let mut slot = WorkerSlot {
            id: WorkerId::new(),
            state: WorkerState::Parsed,
            worker,
        };
        let id = slot.id;
        self.emit(HostEvent::UpdateFound { worker_id: id });
        self.set_state(&mut slot, WorkerState::Installing);

        let dispatch = slot.worker.dispatch(WorkerEvent::Install);
        {
            let mut registration = self.registration.write().await;
            if let Some(mut previous) = registration.installing.replace(slot) {
                self.set_state(&mut previous, WorkerState::Redundant);
            }
        }

        let installed = dispatch.complete().await;

        let mut registration = self.registration.write().await;
        let mut slot = match registration.installing.take() {
            Some(slot) if slot.id == id => slot,
            newer => {
                registration.installing = newer;
                return Err(RemcError::State("install superseded".to_string()));
            }
        };

        let skip_waiting = match installed {
            Ok(Completed {
                outcome: Some(EventOutcome::Installed(outcome)),
                ..
            }) => outcome.skip_waiting,
            Ok(_) => false,
            Err(err) => {
                error!(
                    version = %slot.worker.config().version,
                    category = err.category(),
                    error = %err,
                    "Install failed, keeping previous worker"
                );
                self.set_state(&mut slot, WorkerState::Redundant);
                return Err(err);
            }
        };

        self.set_state(&mut slot, WorkerState::Installed);
        if let Some(mut previous) = registration.waiting.replace(slot) {
            self.set_state(&mut previous, WorkerState::Redundant);
        }
        drop(registration);

        if skip_waiting {
            self.activate_waiting().await?;
        }
        Ok(id)
    }

    /// Promote the waiting generation to active.
    pub async fn activate_waiting(&self) -> Result<()> {
        let mut slot = {
            let mut registration = self.registration.write().await;
            registration
                .waiting
                .take()
                .ok_or_else(|| RemcError::State("no waiting worker".to_string()))?
        };
        self.set_state(&mut slot, WorkerState::Activating);

        let completed = slot.worker.dispatch(WorkerEvent::Activate).complete().await;

        let mut registration = self.registration.write().await;
        if let Some(mut previous) = registration.active.take() {
            self.set_state(&mut previous, WorkerState::Redundant);
        }
        // A failed activate still activates, as in browsers.
        if let Err(err) = completed {
            warn!(error = %err, "Activate handler failed");
        }
        self.set_state(&mut slot, WorkerState::Activated);
        self.emit(HostEvent::ControllerChange { worker_id: slot.id });
        info!(version = %slot.worker.config().version, "Worker active");
        registration.active = Some(slot);
        Ok(())
    }

    async fn active_worker(&self) -> Option<ServiceWorker> {
        let registration = self.registration.read().await;
        registration
            .active
            .as_ref()
            .filter(|slot| slot.state.can_intercept_fetch())
            .map(|slot| slot.worker.clone())
    }

    /// Answer a page request. Without an active worker it goes straight to
    /// the network. Cache writes run as spawned tasks after the response is
    /// delivered; [`WorkerHost::idle`] waits for them.
    pub async fn fetch(&self, request: Request) -> Option<Served> {
        let Some(worker) = self.active_worker().await else {
            return self.fetcher.fetch(&request).await.ok().map(|response| Served {
                response,
                from: ServedFrom::Network,
            });
        };

        let dispatch = worker.dispatch(WorkerEvent::Fetch(request));
        let response = match dispatch.respond_with {
            Some(response) => response.await,
            None => None,
        };
        let pending = dispatch.wait_until;
        if !pending.is_empty() {
            let mut background = self.background.lock().await;
            // Reap finished writes so the set only holds running ones.
            while let Some(finished) = background.try_join_next() {
                if let Err(err) = flatten(finished) {
                    warn!(error = %err, "Background cache write failed");
                }
            }
            background.spawn(async move { pending.settle().await });
        }
        response
    }

    /// Deliver a push, notification click or sync event to the active
    /// worker and wait for its pending work.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<Option<EventOutcome>> {
        if matches!(
            event.kind(),
            EventKind::Install | EventKind::Activate | EventKind::Fetch
        ) {
            return Err(RemcError::InvalidArgument(format!(
                "{} events are driven by the host",
                event.kind().as_str()
            )));
        }
        let worker = self
            .active_worker()
            .await
            .ok_or_else(|| RemcError::State("no active worker".to_string()))?;
        Ok(worker.dispatch(event).complete().await?.outcome)
    }

    /// Wait for all background work from earlier fetches. The first
    /// failure is returned once every task has finished.
    pub async fn idle(&self) -> Result<()> {
        let mut running = std::mem::take(&mut *self.background.lock().await);
        let mut first_error = None;
        while let Some(finished) = running.join_next().await {
            if let Err(err) = flatten(finished) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn active(&self) -> Option<WorkerInfo> {
        self.registration.read().await.active.as_ref().map(WorkerSlot::info)
    }

    pub async fn waiting(&self) -> Option<WorkerInfo> {
        self.registration.read().await.waiting.as_ref().map(WorkerSlot::info)
    }

    pub async fn installing(&self) -> Option<WorkerInfo> {
        self.registration.read().await.installing.as_ref().map(WorkerSlot::info)
    }
}
