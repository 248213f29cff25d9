use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::Cancelable;
use crate::config::PoolConfig;
use crate::error::{CoordinatorError, Result};

/// Executes submitted work asynchronously.
pub trait ThreadPool: Send + Sync {
    /// Schedule `task` and return without waiting for it to run.
    fn submit(&self, task: Arc<dyn Cancelable>) -> Result<TaskHandle>;
}

/// Handle to a submitted unit of work.
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<dyn Cancelable>,
    done: Arc<AtomicBool>,
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

impl TaskHandle {
    /// Pools create one handle per submission and call [`Self::mark_done`]
    /// once the task's `run` has returned, panicked, or will never be
    /// called.
    pub fn new(task: Arc<dyn Cancelable>) -> Self {
        Self {
            task,
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }
}

/// [`ThreadPool`] backed by a tokio runtime.
///
/// A semaphore caps how many tasks run at once; tasks beyond the cap wait
/// for a slot. `shutdown` cancels everything queued or running and rejects
/// further submissions.
pub struct TokioThreadPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    shutdown: CancellationToken,
}

impl fmt::Debug for TokioThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioThreadPool")
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.permits.available_permits())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl TokioThreadPool {
    pub fn new(runtime: Handle, config: &PoolConfig) -> Self {
        let max_concurrent = config.max_concurrent_batches.max(1);
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            shutdown: CancellationToken::new(),
        }
    }

    /// Pool on the runtime the caller is running in.
    pub fn current(config: &PoolConfig) -> Self {
        Self::new(Handle::current(), config)
    }

    pub fn shutdown(&self) {
        debug!(target: "conduit::pool", "thread pool shutting down");
        self.shutdown.cancel();
    }
}

impl ThreadPool for TokioThreadPool {
    fn submit(&self, task: Arc<dyn Cancelable>) -> Result<TaskHandle> {
        if self.shutdown.is_cancelled() {
            return Err(CoordinatorError::PoolShutdown);
        }

        let handle = TaskHandle::new(Arc::clone(&task));
        let tracked = handle.clone();
        let permits = Arc::clone(&self.permits);
        let shutdown = self.shutdown.clone();

        self.runtime.spawn(async move {
            let outcome = AssertUnwindSafe(run_with_permit(
                Arc::clone(&task),
                permits,
                shutdown,
            ))
            .catch_unwind()
            .await;

            if let Err(panic) = outcome {
                error!(
                    target: "conduit::pool",
                    panic = %panic_message(&*panic),
                    "pooled task panicked"
                );
                task.cancel();
            }
            tracked.mark_done();
        });

        Ok(handle)
    }
}

async fn run_with_permit(
    task: Arc<dyn Cancelable>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let permit = tokio::select! {
        _ = shutdown.cancelled() => None,
        permit = permits.acquire_owned() => permit.ok(),
    };

    let Some(_permit) = permit else {
        task.cancel();
        return;
    };

    let mut run = task.run();
    tokio::select! {
        _ = &mut run => {}
        _ = shutdown.cancelled() => {
            task.cancel();
            run.await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
