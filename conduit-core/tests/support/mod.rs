//! Shared harness for coordinator integration tests.
#![allow(dead_code)]

pub mod connector;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use conduit_core::batch::{
    BatchResultRecorder, Cancelable, TaskHandle, ThreadPool,
};
use conduit_core::error::{CoordinatorError, Result};
use conduit_core::spi::{ConfigMap, Document};
use conduit_core::{
    BatchResult, ConnectorCoordinator, CoordinatorConfig, CoordinatorContext,
    InMemoryStore, PersistentStore, PushError, Pusher, PusherFactory,
    PusherStatus, TypeInfo,
};
use tempfile::TempDir;

pub use connector::{FakeConnectorType, Ledger, Verdict};

pub const PROTOTYPE: &str = "<bean id=\"connectorInstance\"/>\n";

/// Pool that records submissions and runs them only when asked.
#[derive(Default)]
pub struct ManualThreadPool {
    submitted: Mutex<Vec<(Arc<dyn Cancelable>, TaskHandle)>>,
    reject: Mutex<bool>,
}

impl ManualThreadPool {
    pub fn submitted(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<TaskHandle> {
        self.submitted
            .lock()
            .unwrap()
            .last()
            .map(|(_, handle)| handle.clone())
    }

    pub fn set_reject(&self, reject: bool) {
        *self.reject.lock().unwrap() = reject;
    }

    /// Run submission `index` to completion on the current task.
    pub async fn run(&self, index: usize) {
        let (task, handle) = self.submitted.lock().unwrap()[index].clone();
        task.run().await;
        handle.mark_done();
    }

    pub async fn run_last(&self) {
        let last = self.submitted().checked_sub(1).expect("nothing submitted");
        self.run(last).await;
    }
}

impl ThreadPool for ManualThreadPool {
    fn submit(&self, task: Arc<dyn Cancelable>) -> Result<TaskHandle> {
        if *self.reject.lock().unwrap() {
            return Err(CoordinatorError::PoolShutdown);
        }
        let handle = TaskHandle::new(Arc::clone(&task));
        self.submitted.lock().unwrap().push((task, handle.clone()));
        Ok(handle)
    }
}

/// Feed for one batch. Documents stay buffered until `flush`.
#[derive(Default)]
pub struct RecordingPusher {
    pub connector: String,
    pub buffered: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<String>>,
    pub canceled: Mutex<bool>,
}

#[async_trait]
impl Pusher for RecordingPusher {
    async fn take(
        &self,
        document: Document,
    ) -> std::result::Result<PusherStatus, PushError> {
        self.buffered.lock().unwrap().push(document.docid);
        // Let concurrently running batches interleave with this one.
        tokio::task::yield_now().await;
        Ok(PusherStatus::Ok)
    }

    async fn flush(&self) -> std::result::Result<(), PushError> {
        let buffered = std::mem::take(&mut *self.buffered.lock().unwrap());
        self.sent.lock().unwrap().extend(buffered);
        Ok(())
    }

    async fn cancel(&self) {
        self.buffered.lock().unwrap().clear();
        *self.canceled.lock().unwrap() = true;
    }
}

/// Opens a fresh [`RecordingPusher`] per batch and keeps all of them.
#[derive(Default)]
pub struct RecordingFeed {
    opened: Mutex<Vec<Arc<RecordingPusher>>>,
}

impl RecordingFeed {
    pub fn opened(&self) -> Vec<Arc<RecordingPusher>> {
        self.opened.lock().unwrap().clone()
    }

    pub fn opened_for(&self, connector: &str) -> Vec<Arc<RecordingPusher>> {
        self.opened()
            .into_iter()
            .filter(|pusher| pusher.connector == connector)
            .collect()
    }

    /// Every document flushed so far, in batch order.
    pub fn sent(&self) -> Vec<String> {
        self.opened()
            .iter()
            .flat_map(|pusher| pusher.sent.lock().unwrap().clone())
            .collect()
    }

    pub fn buffered_for(&self, connector: &str) -> usize {
        self.opened_for(connector)
            .iter()
            .map(|pusher| pusher.buffered.lock().unwrap().len())
            .sum()
    }
}

impl PusherFactory for RecordingFeed {
    fn new_pusher(
        &self,
        connector_name: &str,
    ) -> std::result::Result<Arc<dyn Pusher>, PushError> {
        let pusher = Arc::new(RecordingPusher {
            connector: connector_name.to_owned(),
            ..RecordingPusher::default()
        });
        self.opened.lock().unwrap().push(Arc::clone(&pusher));
        Ok(pusher)
    }
}

/// Store whose checkpoint slot cannot be erased.
pub struct StuckCheckpointStore {
    pub inner: Arc<InMemoryStore>,
}

#[async_trait]
impl PersistentStore for StuckCheckpointStore {
    async fn connector_config(&self, name: &str) -> Result<Option<ConfigMap>> {
        self.inner.connector_config(name).await
    }

    async fn store_connector_config(
        &self,
        name: &str,
        config: &ConfigMap,
    ) -> Result<()> {
        self.inner.store_connector_config(name, config).await
    }

    async fn remove_connector_config(&self, name: &str) -> Result<()> {
        self.inner.remove_connector_config(name).await
    }

    async fn connector_schedule(&self, name: &str) -> Result<Option<String>> {
        self.inner.connector_schedule(name).await
    }

    async fn store_connector_schedule(
        &self,
        name: &str,
        schedule: &str,
    ) -> Result<()> {
        self.inner.store_connector_schedule(name, schedule).await
    }

    async fn remove_connector_schedule(&self, name: &str) -> Result<()> {
        self.inner.remove_connector_schedule(name).await
    }

    async fn connector_state(&self, name: &str) -> Result<Option<String>> {
        self.inner.connector_state(name).await
    }

    async fn store_connector_state(
        &self,
        name: &str,
        state: &str,
    ) -> Result<()> {
        self.inner.store_connector_state(name, state).await
    }

    async fn remove_connector_state(&self, name: &str) -> Result<()> {
        Err(CoordinatorError::Store(format!(
            "checkpoint of {name} is read-only"
        )))
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    results: Mutex<Vec<BatchResult>>,
}

impl RecordingRecorder {
    pub fn results(&self) -> Vec<BatchResult> {
        self.results.lock().unwrap().clone()
    }
}

impl BatchResultRecorder for RecordingRecorder {
    fn record_result(&self, result: &BatchResult) {
        self.results.lock().unwrap().push(result.clone());
    }
}

pub struct Harness {
    pub root: TempDir,
    pub store: Arc<InMemoryStore>,
    pub pool: Arc<ManualThreadPool>,
    pub feed: Arc<RecordingFeed>,
    pub connector_type: Arc<FakeConnectorType>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_documents(10)
    }

    pub fn with_documents(documents: usize) -> Self {
        Self {
            root: tempfile::tempdir().expect("tempdir"),
            store: Arc::new(InMemoryStore::new()),
            pool: Arc::new(ManualThreadPool::default()),
            feed: Arc::new(RecordingFeed::default()),
            connector_type: Arc::new(FakeConnectorType::new(documents)),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.connector_type.ledger
    }

    pub fn context_with_pool(
        &self,
        pool: Arc<dyn ThreadPool>,
    ) -> CoordinatorContext {
        CoordinatorContext {
            pushers: self.feed.clone(),
            pool,
            store: self.store.clone(),
            config: CoordinatorConfig {
                work_dir: self.root.path().join("common"),
                ..CoordinatorConfig::default()
            },
        }
    }

    pub fn context(&self) -> CoordinatorContext {
        self.context_with_pool(self.pool.clone())
    }

    pub fn type_info(&self, type_name: &str) -> Arc<TypeInfo> {
        Arc::new(
            TypeInfo::new(
                type_name,
                self.connector_type.clone(),
                self.root.path().join(type_name),
            )
            .with_instance_prototype(PROTOTYPE),
        )
    }

    pub fn coordinator(&self, name: &str) -> Arc<ConnectorCoordinator> {
        ConnectorCoordinator::new(name, self.context())
    }
}

pub fn config(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
