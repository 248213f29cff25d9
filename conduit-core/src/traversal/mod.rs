//! Traversal: pulling bounded batches of documents out of a connector.

pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub use query::QueryTraverser;

/// How soon the scheduler should run the next batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TraversalDelayPolicy {
    /// More work is likely available right away.
    Immediate,
    /// The repository had nothing new; wait for the regular interval.
    Poll,
    /// The batch failed; back off before retrying.
    Error,
}

/// Outcome of one traversal batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub delay_policy: TraversalDelayPolicy,
    /// Documents accepted by the feed.
    pub count: usize,
    /// Checkpoint to resume from next time. `None` keeps the stored one.
    pub checkpoint: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub canceled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn completed(
        count: usize,
        checkpoint: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let delay_policy = if count == 0 {
            TraversalDelayPolicy::Poll
        } else {
            TraversalDelayPolicy::Immediate
        };
        Self {
            delay_policy,
            count,
            checkpoint,
            error: None,
            canceled: false,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn poll(started_at: DateTime<Utc>) -> Self {
        Self::completed(0, None, started_at)
    }

    pub fn failed(
        count: usize,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            delay_policy: TraversalDelayPolicy::Error,
            count,
            checkpoint: None,
            error: Some(error.into()),
            canceled: false,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn canceled(count: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            delay_policy: TraversalDelayPolicy::Immediate,
            count,
            checkpoint: None,
            error: None,
            canceled: true,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Runs one traversal batch against a connector.
#[async_trait]
pub trait Traverser: Send + Sync {
    /// Process at most `batch_hint` documents. `cancel` is checked between
    /// documents; a canceled batch reports no checkpoint.
    async fn run_batch(
        &self,
        batch_hint: usize,
        cancel: &CancellationToken,
    ) -> BatchResult;
}
