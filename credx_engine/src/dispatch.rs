use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Completion callback: invoked exactly once with the caller's correlation
/// handle and the operation result, never both a success and an error, never
/// zero times barring process shutdown.
pub type Callback<T> = Box<dyn FnOnce(u32, EngineResult<T>) + Send + 'static>;

struct Inflight {
    count: AtomicUsize,
    drained: Notify,
}

/// Command/callback substrate underneath the engine's public operations.
///
/// `submit` returns synchronously with either a validation error or
/// success-of-enqueue; the work itself runs on the tokio worker pool and the
/// continuation fires on completion. Cancellation is not supported mid-flight;
/// the caller's recourse is to ignore the eventual callback.
pub struct Dispatcher {
    inflight: Arc<Inflight>,
    closed: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            inflight: Arc::new(Inflight {
                count: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue `work`, invoking `callback` exactly once on completion.
    /// Fails fast once the dispatcher is shut down.
    pub fn submit<T, F>(&self, command_handle: u32, work: F, callback: Callback<T>) -> EngineResult<()>
    where
        T: Send + 'static,
        F: Future<Output = EngineResult<T>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(EngineError::Shutdown(
                "dispatcher has been shut down".to_string(),
            ));
        }

        self.inflight.count.fetch_add(1, Ordering::SeqCst);
        let inflight = self.inflight.clone();
        tokio::spawn(async move {
            // the guard keeps the in-flight count correct even if the
            // callback panics
            let _guard = InflightGuard(inflight);
            let result = work.await;
            callback(command_handle, result);
        });
        Ok(())
    }

    pub fn inflight(&self) -> usize {
        self.inflight.count.load(Ordering::SeqCst)
    }

    /// Reject new submissions, then wait until every in-flight operation has
    /// completed or been safely abandoned. Idempotent.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        trace!(inflight = self.inflight(), "dispatcher shutting down");
        loop {
            if self.inflight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.inflight.drained.notified();
            if self.inflight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new()
    }
}

struct InflightGuard(Arc<Inflight>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}
