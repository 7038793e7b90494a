//! # REMC Offline Worker
//!
//! Offline support for the REMC web app, modelled as a service worker that
//! sits between the app's pages and the network.
//!
//! ## Features
//!
//! - **Install**: pre-caches a fixed asset list, all-or-nothing
//! - **Activate**: drops cache generations from older versions, claims tabs
//! - **Fetch**: network-first for `/api/`, cache-first for everything else
//! - **Push / click / sync**: notification display, window focus, sync hook
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (registration)
//!     │
//!     └── ServiceWorker::dispatch(WorkerEvent) → Dispatch
//!             ├── lifecycle::{install, activate}
//!             ├── router::Router (fetch)
//!             └── notify::{handle_push, handle_click, handle_sync}
//!
//! CacheStorage
//!     ├── <prefix>-static-<version>
//!     └── <prefix>-dynamic-<version>
//! ```
//!
//! Known limitation: the dynamic cache has no eviction and grows with every
//! distinct cacheable URL until the next version bump.

pub mod cache;
pub mod clients;
pub mod config;
pub mod host;
pub mod lifecycle;
pub mod notify;
pub mod pending;
pub mod router;
pub mod worker;

pub use cache::{CacheEntry, CacheKey, CacheStorage, MemoryCacheStorage};
pub use clients::{Client, ClientId, ClientRegistry, ClientType, WindowClients};
pub use config::{NotificationConfig, WorkerConfig, DEFAULT_ORIGIN, DEFAULT_STATIC_ASSETS};
pub use host::{HostEvent, WorkerHost, WorkerId, WorkerInfo};
pub use lifecycle::{ActivateOutcome, InstallOutcome, WorkerState};
pub use notify::{
    ClickOutcome, DataSync, NoopDataSync, Notification, NotificationCenter,
    NotificationClickEvent, NotificationSurface, PushEvent, SyncEvent, SyncOutcome,
};
pub use pending::PendingWork;
pub use router::{RouteStrategy, Router, Served, ServedFrom};
pub use worker::{Completed, Dispatch, EventKind, EventOutcome, ServiceWorker, WorkerEvent};
