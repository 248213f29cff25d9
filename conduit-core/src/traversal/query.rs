use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BatchResult, Traverser};
use crate::persist::TraversalStateStore;
use crate::pusher::{PushError, Pusher, PusherFactory, PusherStatus};
use crate::spi::{DocumentList, RepositoryError, TraversalManager};

/// Traverser that resumes from the stored checkpoint, feeds documents to a
/// pusher opened for the batch, and reports the checkpoint reached.
///
/// It only reads checkpoints. Persisting the reported checkpoint is up to
/// whoever accepts the [`BatchResult`].
pub struct QueryTraverser {
    connector_name: String,
    traversal_manager: Arc<dyn TraversalManager>,
    pushers: Arc<dyn PusherFactory>,
    state_store: TraversalStateStore,
}

impl fmt::Debug for QueryTraverser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryTraverser")
            .field("connector_name", &self.connector_name)
            .field("state_store", &self.state_store)
            .finish()
    }
}

impl QueryTraverser {
    pub fn new(
        connector_name: impl Into<String>,
        traversal_manager: Arc<dyn TraversalManager>,
        pushers: Arc<dyn PusherFactory>,
        state_store: TraversalStateStore,
    ) -> Self {
        Self {
            connector_name: connector_name.into(),
            traversal_manager,
            pushers,
            state_store,
        }
    }

    async fn open_list(
        &self,
    ) -> Result<Option<Box<dyn DocumentList>>, String> {
        let checkpoint = self
            .state_store
            .traversal_state()
            .await
            .map_err(|err| format!("can't read checkpoint: {err}"))?;

        let list = match checkpoint.as_deref() {
            Some(checkpoint) => {
                debug!(
                    target: "conduit::traversal",
                    connector = %self.connector_name,
                    checkpoint,
                    "resuming traversal"
                );
                self.traversal_manager.resume_traversal(checkpoint).await
            }
            None => {
                info!(
                    target: "conduit::traversal",
                    connector = %self.connector_name,
                    "starting traversal from the beginning"
                );
                self.traversal_manager.start_traversal().await
            }
        };
        list.map_err(|err| err.to_string())
    }

    /// Log the failure and drop whatever `pusher` still buffers.
    async fn fail(
        &self,
        pusher: Option<&dyn Pusher>,
        count: usize,
        error: String,
        started_at: DateTime<Utc>,
    ) -> BatchResult {
        warn!(
            target: "conduit::traversal",
            connector = %self.connector_name,
            count,
            error = %error,
            "traversal batch failed"
        );
        if let Some(pusher) = pusher {
            pusher.cancel().await;
        }
        BatchResult::failed(count, error, started_at)
    }

    async fn push_documents(
        &self,
        list: &mut dyn DocumentList,
        pusher: &dyn Pusher,
        batch_hint: usize,
        cancel: &CancellationToken,
        started_at: DateTime<Utc>,
    ) -> BatchResult {
        let mut count = 0;
        while count < batch_hint {
            if cancel.is_cancelled() {
                break;
            }

            let document = match list.next_document().await {
                Ok(Some(document)) => document,
                Ok(None) => break,
                Err(RepositoryError::Document(reason)) => {
                    warn!(
                        target: "conduit::traversal",
                        connector = %self.connector_name,
                        reason = %reason,
                        "skipping unreadable document"
                    );
                    continue;
                }
                Err(err) => {
                    return self
                        .fail(Some(pusher), count, err.to_string(), started_at)
                        .await;
                }
            };

            match pusher.take(document).await {
                Ok(PusherStatus::Ok) => count += 1,
                Ok(PusherStatus::Disabled) => {
                    count += 1;
                    debug!(
                        target: "conduit::traversal",
                        connector = %self.connector_name,
                        count,
                        "feed disabled; ending batch early"
                    );
                    break;
                }
                Err(PushError::Rejected { docid, reason }) => {
                    warn!(
                        target: "conduit::traversal",
                        connector = %self.connector_name,
                        docid = %docid,
                        reason = %reason,
                        "feed rejected document"
                    );
                }
                Err(err) => {
                    return self
                        .fail(Some(pusher), count, err.to_string(), started_at)
                        .await;
                }
            }
        }

        if cancel.is_cancelled() {
            info!(
                target: "conduit::traversal",
                connector = %self.connector_name,
                count,
                "traversal batch canceled"
            );
            pusher.cancel().await;
            return BatchResult::canceled(count, started_at);
        }

        if let Err(err) = pusher.flush().await {
            return self
                .fail(Some(pusher), count, err.to_string(), started_at)
                .await;
        }

        match list.checkpoint().await {
            Ok(checkpoint) => {
                BatchResult::completed(count, checkpoint, started_at)
            }
            Err(err) => {
                let error = format!("can't compute checkpoint: {err}");
                self.fail(Some(pusher), count, error, started_at).await
            }
        }
    }
}

#[async_trait]
impl Traverser for QueryTraverser {
    async fn run_batch(
        &self,
        batch_hint: usize,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let started_at = Utc::now();
        self.traversal_manager.set_batch_hint(batch_hint);

        let mut list = match self.open_list().await {
            Ok(Some(list)) => list,
            Ok(None) => return BatchResult::poll(started_at),
            Err(err) => return self.fail(None, 0, err, started_at).await,
        };

        let pusher = match self.pushers.new_pusher(&self.connector_name) {
            Ok(pusher) => pusher,
            Err(err) => {
                let error = format!("can't open feed: {err}");
                return self.fail(None, 0, error, started_at).await;
            }
        };

        self.push_documents(
            list.as_mut(),
            pusher.as_ref(),
            batch_hint,
            cancel,
            started_at,
        )
        .await
    }
}
