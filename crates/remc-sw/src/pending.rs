//! Work an event handler asks the host to keep the worker alive for.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use remc_common::Result;

type Task = BoxFuture<'static, Result<()>>;

/// Extended-lifetime work registered by one event.
///
/// Handlers register futures with [`PendingWork::wait_until`]; the host
/// awaits [`PendingWork::settle`] before treating the event as handled.
/// Work not registered here may be dropped with the worker.
#[derive(Clone, Default)]
pub struct PendingWork {
    tasks: Arc<Mutex<Vec<Task>>>,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `work`. May be called while other work is settling.
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.lock().push(work.boxed());
    }

    /// Number of registered futures not yet picked up by `settle`.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drive every registered future to completion, including ones
    /// registered meanwhile. All run to the end; the first error wins.
    pub async fn settle(&self) -> Result<()> {
        let mut first_error = None;
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for result in join_all(batch).await {
                if let Err(err) = result {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWork")
            .field("outstanding", &self.len())
            .finish()
    }
}
