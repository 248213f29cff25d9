//! Cancelable traversal batches and the pool that runs them.

pub mod pool;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::traversal::{BatchResult, Traverser};

pub use pool::{TaskHandle, ThreadPool, TokioThreadPool};

/// Identifies one batch submission. Completion and cancellation reports are
/// honored only while their key is the coordinator's active key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BatchKey(pub Uuid);

impl Default for BatchKey {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchKey {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives the result of an accepted batch, e.g. a host-load tracker.
///
/// Called while the coordinator's lock is held; implementations must not
/// call back into the same coordinator.
pub trait BatchResultRecorder: Send + Sync {
    fn record_result(&self, result: &BatchResult);
}

/// Where a finished batch reports its result.
#[async_trait]
pub trait BatchCompletion: Send + Sync {
    async fn batch_completed(&self, key: BatchKey, result: BatchResult);
}

/// A unit of work a [`ThreadPool`] can run and cancel.
#[async_trait]
pub trait Cancelable: Send + Sync {
    async fn run(&self);

    /// Request cooperative cancellation. Safe to call before, during or
    /// after `run`.
    fn cancel(&self);
}

/// One traversal run bound to a traverser and a batch key.
pub struct CancelableBatch {
    connector_name: String,
    key: BatchKey,
    traverser: Arc<dyn Traverser>,
    batch_hint: usize,
    completion: Arc<dyn BatchCompletion>,
    cancel: CancellationToken,
}

impl fmt::Debug for CancelableBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelableBatch")
            .field("connector_name", &self.connector_name)
            .field("key", &self.key)
            .field("batch_hint", &self.batch_hint)
            .field("canceled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl CancelableBatch {
    pub fn new(
        connector_name: impl Into<String>,
        key: BatchKey,
        traverser: Arc<dyn Traverser>,
        batch_hint: usize,
        completion: Arc<dyn BatchCompletion>,
    ) -> Self {
        Self {
            connector_name: connector_name.into(),
            key,
            traverser,
            batch_hint,
            completion,
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Cancelable for CancelableBatch {
    async fn run(&self) {
        if self.cancel.is_cancelled() {
            debug!(
                target: "conduit::batch",
                connector = %self.connector_name,
                key = %self.key,
                "batch canceled before it started"
            );
            return;
        }

        let result = self
            .traverser
            .run_batch(self.batch_hint, &self.cancel)
            .await;

        // Whoever canceled us already dropped the key; nothing to report.
        if self.cancel.is_cancelled() {
            debug!(
                target: "conduit::batch",
                connector = %self.connector_name,
                key = %self.key,
                count = result.count,
                "batch canceled; discarding result"
            );
            return;
        }

        debug!(
            target: "conduit::batch",
            connector = %self.connector_name,
            key = %self.key,
            count = result.count,
            policy = ?result.delay_policy,
            "batch finished"
        );
        self.completion.batch_completed(self.key, result).await;
    }

    fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tokio::sync::Mutex;

    use super::*;

    struct CountingTraverser {
        count: usize,
    }

    #[async_trait]
    impl Traverser for CountingTraverser {
        async fn run_batch(
            &self,
            batch_hint: usize,
            cancel: &CancellationToken,
        ) -> BatchResult {
            if cancel.is_cancelled() {
                return BatchResult::canceled(0, Utc::now());
            }
            let count = self.count.min(batch_hint);
            BatchResult::completed(
                count,
                Some(format!("ck{count}")),
                Utc::now(),
            )
        }
    }

    #[derive(Default)]
    struct CollectingCompletion {
        completed: Mutex<Vec<(BatchKey, BatchResult)>>,
    }

    #[async_trait]
    impl BatchCompletion for CollectingCompletion {
        async fn batch_completed(&self, key: BatchKey, result: BatchResult) {
            self.completed.lock().await.push((key, result));
        }
    }

    #[test]
    fn keys_are_unique() {
        assert_ne!(BatchKey::new(), BatchKey::new());
    }

    #[tokio::test]
    async fn run_reports_result_under_its_key() {
        let completion = Arc::new(CollectingCompletion::default());
        let key = BatchKey::new();
        let batch = CancelableBatch::new(
            "c1",
            key,
            Arc::new(CountingTraverser { count: 12 }),
            5,
            completion.clone(),
        );

        batch.run().await;

        let completed = completion.completed.lock().await;
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].0, key);
        assert_eq!(completed[0].1.count, 5);
        assert_eq!(completed[0].1.checkpoint.as_deref(), Some("ck5"));
    }

    #[tokio::test]
    async fn canceled_batch_reports_nothing() {
        let completion = Arc::new(CollectingCompletion::default());
        let batch = CancelableBatch::new(
            "c1",
            BatchKey::new(),
            Arc::new(CountingTraverser { count: 3 }),
            5,
            completion.clone(),
        );

        batch.cancel();
        batch.run().await;

        assert!(completion.completed.lock().await.is_empty());
    }
}
