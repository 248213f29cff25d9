//! Lifecycle owner for one named connector.
//!
//! The coordinator serializes every operation on its connector behind a
//! single async mutex: configuration changes, removal, schedule updates and
//! batch bookkeeping never interleave. Traversal itself runs on the thread
//! pool outside that lock; a finished batch re-enters through
//! [`ConnectorCoordinator::complete_batch`], which only accepts the result if
//! the batch's key is still the active one.
//!
//! State per coordinator:
//! - configuration: absent or configured (instance + type, always together),
//! - batch: idle or running (an active [`BatchKey`]),
//! - interfaces: built or invalidated. Every invalidation starts a new
//!   checkpoint generation, so writes from older traversers are dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::batch::{
    BatchCompletion, BatchKey, BatchResultRecorder, CancelableBatch,
    TaskHandle, ThreadPool,
};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::instance::{
    InstanceInfo, PROPERTY_CONNECTOR_NAME, PROPERTY_CONNECTOR_WORK_DIR,
    PROPERTY_WORK_DIR, TypeInfo, workdir,
};
use crate::interfaces::ConnectorInterfaces;
use crate::persist::{
    GenerationalStateStore, PersistentStore, TraversalStateStore,
};
use crate::pusher::PusherFactory;
use crate::spi::{
    AuthenticationManager, AuthorizationManager, ConfigMap,
    ConfigureResponse, Connector, ConnectorFactory, Locale,
};
use crate::traversal::{BatchResult, Traverser};

/// Collaborators shared by every coordinator in a process.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub pushers: Arc<dyn PusherFactory>,
    pub pool: Arc<dyn ThreadPool>,
    pub store: Arc<dyn PersistentStore>,
    pub config: CoordinatorConfig,
}

impl fmt::Debug for CoordinatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct ActiveBatch {
    key: BatchKey,
    task: TaskHandle,
    recorder: Arc<dyn BatchResultRecorder>,
    // Generation the batch's traverser was built under.
    checkpoint: TraversalStateStore,
}

#[derive(Default)]
struct CoordinatorState {
    instance: Option<InstanceInfo>,
    interfaces: Option<Arc<ConnectorInterfaces>>,
    batch: Option<ActiveBatch>,
}

enum Validation {
    Rejected(ConfigureResponse),
    Accepted(ConfigMap),
}

pub struct ConnectorCoordinator {
    name: String,
    context: CoordinatorContext,
    checkpoints: Arc<GenerationalStateStore>,
    state: Mutex<CoordinatorState>,
    this: Weak<ConnectorCoordinator>,
}

impl fmt::Debug for ConnectorCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ConnectorCoordinator");
        debug.field("name", &self.name);
        match self.state.try_lock() {
            Ok(state) => debug
                .field("configured", &state.instance.is_some())
                .field("interfaces_built", &state.interfaces.is_some())
                .field("active_batch", &state.batch.as_ref().map(|b| b.key)),
            Err(_) => debug.field("state", &"<locked>"),
        };
        debug.finish()
    }
}

impl ConnectorCoordinator {
    /// Coordinator for a connector that does not exist yet.
    pub fn new(
        name: impl Into<String>,
        context: CoordinatorContext,
    ) -> Arc<Self> {
        let name = name.into();
        let checkpoints = Arc::new(GenerationalStateStore::new(
            name.clone(),
            Arc::clone(&context.store),
        ));
        Arc::new_cyclic(|this| Self {
            name,
            context,
            checkpoints,
            state: Mutex::new(CoordinatorState::default()),
            this: this.clone(),
        })
    }

    /// Coordinator for a connector whose configuration was persisted earlier.
    pub async fn restore(
        name: impl Into<String>,
        type_info: Arc<TypeInfo>,
        context: CoordinatorContext,
    ) -> Result<Arc<Self>> {
        let coordinator = Self::new(name, context);
        coordinator.revive(type_info).await?;
        Ok(coordinator)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn exists(&self) -> bool {
        self.state.lock().await.instance.is_some()
    }

    /// Rebuild the live connector from persisted configuration, e.g. after
    /// [`Self::shutdown`].
    pub async fn revive(&self, type_info: Arc<TypeInfo>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.instance.is_some() {
            return Err(CoordinatorError::ConnectorAlreadyExists(
                self.name.clone(),
            ));
        }
        self.reset_interfaces(&mut state).await;
        let instance = InstanceInfo::from_stored_config(
            &self.name,
            type_info,
            Arc::clone(&self.context.store),
            Arc::clone(&self.checkpoints),
        )
        .await?;
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            "connector revived from stored configuration"
        );
        state.instance = Some(instance);
        Ok(())
    }

    pub async fn type_info(&self) -> Option<Arc<TypeInfo>> {
        let state = self.state.lock().await;
        state
            .instance
            .as_ref()
            .map(|instance| Arc::clone(instance.type_info()))
    }

    pub async fn type_name(&self) -> Result<String> {
        let state = self.state.lock().await;
        let instance = self.instance(&state)?;
        Ok(instance.type_info().type_name().to_owned())
    }

    /// Create (`update == false`) or reconfigure (`update == true`) the
    /// connector.
    ///
    /// Returns `Ok(Some(response))` when the configuration was rejected and
    /// the form should be redisplayed; nothing changes in that case.
    pub async fn set_config(
        &self,
        type_info: Arc<TypeInfo>,
        config: ConfigMap,
        locale: &Locale,
        update: bool,
    ) -> Result<Option<ConfigureResponse>> {
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            type_name = %type_info.type_name(),
            update,
            "configuring connector"
        );
        let mut state = self.state.lock().await;
        self.reset_interfaces(&mut state).await;

        let current = state.instance.as_ref().map(|instance| {
            (
                Arc::clone(instance.type_info()),
                instance.connector_dir().to_path_buf(),
            )
        });

        match current {
            Some(_) if !update => Err(
                CoordinatorError::ConnectorAlreadyExists(self.name.clone()),
            ),
            Some((current_type, connector_dir))
                if current_type.same_type(&type_info) =>
            {
                self.reset_config(
                    &mut state,
                    connector_dir,
                    current_type,
                    config,
                    locale,
                )
                .await
            }
            Some((current_type, _)) => {
                // Changing the type is a drop followed by an add. If the add
                // fails the old connector is not restored.
                info!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    from = %current_type.type_name(),
                    to = %type_info.type_name(),
                    "connector type changed; replacing connector"
                );
                self.remove_locked(&mut state).await;
                let outcome = self
                    .create_new_connector(&mut state, type_info, config, locale)
                    .await;
                if !matches!(outcome, Ok(None)) {
                    error!(
                        target: "conduit::coordinator",
                        connector = %self.name,
                        "failed to update connector config; previous configuration was removed"
                    );
                }
                outcome
            }
            None if update => Err(CoordinatorError::not_found(&self.name)),
            None => {
                self.create_new_connector(&mut state, type_info, config, locale)
                    .await
            }
        }
    }

    pub async fn config(&self) -> Result<ConfigMap> {
        let state = self.state.lock().await;
        Ok(self.instance(&state)?.connector_config().clone())
    }

    /// Configuration form populated with the current configuration.
    pub async fn config_form(
        &self,
        locale: &Locale,
    ) -> Result<ConfigureResponse> {
        let state = self.state.lock().await;
        let instance = self.instance(&state)?;
        instance
            .type_info()
            .connector_type()
            .populated_config_form(instance.connector_config(), locale)
            .await
            .map_err(|err| {
                CoordinatorError::instantiation(
                    &self.name,
                    format!("failed to get configuration form: {err}"),
                )
            })
    }

    /// Drop the connector for good: notify it, erase persisted state and its
    /// working directory, and cancel any running batch.
    pub async fn remove(&self) {
        let mut state = self.state.lock().await;
        self.remove_locked(&mut state).await;
    }

    pub async fn schedule(&self) -> Result<Option<String>> {
        let state = self.state.lock().await;
        self.instance(&state)?.connector_schedule().await
    }

    pub async fn set_schedule(&self, schedule: Option<&str>) -> Result<()> {
        let state = self.state.lock().await;
        self.instance(&state)?.set_connector_schedule(schedule).await
    }

    /// Forget the checkpoint so the next batch starts from the beginning.
    pub async fn restart_traversal(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            "restarting traversal"
        );
        // New generation first: a batch still writing under the old one
        // either lands before the clear or is dropped.
        self.reset_interfaces(&mut state).await;
        if let Some(instance) = state.instance.as_ref() {
            instance.set_connector_state(None).await?;
        }
        Ok(())
    }

    /// Store a checkpoint at the current generation. A missing connector is
    /// not an error here.
    pub async fn store_traversal_state(
        &self,
        state: Option<&str>,
    ) -> Result<()> {
        let guard = self.state.lock().await;
        if let Some(instance) = guard.instance.as_ref() {
            instance.set_connector_state(state).await?;
        }
        Ok(())
    }

    /// Stored checkpoint, or `None` if there is none or no connector.
    pub async fn traversal_state(&self) -> Result<Option<String>> {
        let guard = self.state.lock().await;
        match guard.instance.as_ref() {
            Some(instance) => instance.connector_state().await,
            None => Ok(None),
        }
    }

    pub async fn authentication_manager(
        &self,
    ) -> Result<Option<Arc<dyn AuthenticationManager>>> {
        let mut state = self.state.lock().await;
        let interfaces = self.connector_interfaces(&mut state).await?;
        interfaces.authentication_manager().await
    }

    pub async fn authorization_manager(
        &self,
    ) -> Result<Option<Arc<dyn AuthorizationManager>>> {
        let mut state = self.state.lock().await;
        let interfaces = self.connector_interfaces(&mut state).await?;
        interfaces.authorization_manager().await
    }

    pub async fn traverser(&self) -> Result<Arc<dyn Traverser>> {
        let mut state = self.state.lock().await;
        let interfaces = self.connector_interfaces(&mut state).await?;
        interfaces.traverser().await
    }

    /// Key of the batch currently outstanding, if any.
    pub async fn active_batch(&self) -> Option<BatchKey> {
        self.state.lock().await.batch.as_ref().map(|batch| batch.key)
    }

    /// Submit a traversal batch unless one is already running.
    ///
    /// Returns the new batch's key, or `None` if a batch is still running or
    /// no traverser could be built (the scheduler simply tries again later).
    pub async fn start_batch(
        &self,
        recorder: Arc<dyn BatchResultRecorder>,
        batch_hint: usize,
    ) -> Result<Option<BatchKey>> {
        let mut state = self.state.lock().await;
        self.instance(&state)?;

        if let Some(batch) = state.batch.as_ref()
            && !batch.task.is_done()
        {
            return Ok(None);
        }
        state.batch = None;

        let interfaces = match self.connector_interfaces(&mut state).await {
            Ok(interfaces) => interfaces,
            Err(err) => {
                self.log_start_failure(&err);
                return Ok(None);
            }
        };
        let traverser = match interfaces.traverser().await {
            Ok(traverser) => traverser,
            Err(err) => {
                self.log_start_failure(&err);
                return Ok(None);
            }
        };

        let key = BatchKey::new();
        let completion: Arc<dyn BatchCompletion> =
            Arc::new(CoordinatorCompletion {
                coordinator: self.this.clone(),
            });
        let batch = Arc::new(CancelableBatch::new(
            self.name.clone(),
            key,
            traverser,
            batch_hint,
            completion,
        ));
        let task = match self.context.pool.submit(batch) {
            Ok(task) => task,
            Err(err) => {
                self.log_start_failure(&err);
                return Ok(None);
            }
        };

        debug!(
            target: "conduit::coordinator",
            connector = %self.name,
            key = %key,
            batch_hint,
            generation = interfaces.generation(),
            "batch submitted"
        );
        state.batch = Some(ActiveBatch {
            key,
            task,
            recorder,
            checkpoint: interfaces.state_store().clone(),
        });
        Ok(Some(key))
    }

    /// [`Self::start_batch`] with the process-wide default batch hint.
    pub async fn start_default_batch(
        &self,
        recorder: Arc<dyn BatchResultRecorder>,
    ) -> Result<Option<BatchKey>> {
        self.start_batch(recorder, self.context.config.default_batch_hint)
            .await
    }

    /// Apply a finished batch's result. Ignored (returns `false`) unless
    /// `key` is the active batch key.
    ///
    /// The reported checkpoint is written under the generation the batch was
    /// started in, so it is dropped if the connector was reconfigured or
    /// restarted meanwhile.
    pub async fn complete_batch(
        &self,
        key: BatchKey,
        new_schedule: Option<&str>,
        result: BatchResult,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let batch = match state.batch.take() {
            Some(batch) if batch.key == key => batch,
            other => {
                state.batch = other;
                debug!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    key = %key,
                    "ignoring completion of superseded batch"
                );
                return Ok(false);
            }
        };

        if let Some(checkpoint) = result.checkpoint.as_deref() {
            match batch.checkpoint.store_traversal_state(Some(checkpoint)).await
            {
                Ok(true) => {}
                Ok(false) => debug!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    key = %key,
                    "checkpoint from superseded generation dropped"
                ),
                Err(err) => warn!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    error = %err,
                    "failed to store checkpoint"
                ),
            }
        }

        let scheduled = match new_schedule {
            Some(schedule) => match self.instance(&state) {
                Ok(instance) => {
                    instance.set_connector_schedule(Some(schedule)).await
                }
                Err(err) => Err(err),
            },
            None => Ok(()),
        };

        batch.recorder.record_result(&result);
        scheduled.map(|_| true)
    }

    /// Cancel the batch identified by `key`. Ignored (returns `false`) unless
    /// it is the active batch.
    pub async fn cancel_batch(&self, key: BatchKey) -> bool {
        let mut state = self.state.lock().await;
        if !state.batch.as_ref().is_some_and(|batch| batch.key == key) {
            return false;
        }
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            key = %key,
            "canceling batch"
        );
        self.reset_batch(&mut state);
        self.reset_interfaces(&mut state).await;
        true
    }

    /// Release the live connector without deleting anything persisted. The
    /// connector can be brought back with [`Self::revive`].
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            "shutting down connector"
        );
        self.reset_batch(&mut state);
        if let Some(instance) = state.instance.take() {
            notify_shutdown(&self.name, instance.connector().as_ref(), false)
                .await;
        }
        self.reset_interfaces(&mut state).await;
    }
}

impl ConnectorCoordinator {
    fn instance<'a>(
        &self,
        state: &'a CoordinatorState,
    ) -> Result<&'a InstanceInfo> {
        state
            .instance
            .as_ref()
            .ok_or_else(|| CoordinatorError::not_found(&self.name))
    }

    async fn reset_interfaces(&self, state: &mut CoordinatorState) {
        state.interfaces = None;
        self.checkpoints.advance().await;
    }

    fn reset_batch(&self, state: &mut CoordinatorState) {
        if let Some(batch) = state.batch.take() {
            batch.task.cancel();
        }
    }

    async fn connector_interfaces(
        &self,
        state: &mut CoordinatorState,
    ) -> Result<Arc<ConnectorInterfaces>> {
        if let Some(interfaces) = state.interfaces.as_ref() {
            return Ok(Arc::clone(interfaces));
        }
        let instance = self.instance(state)?;
        let interfaces = Arc::new(ConnectorInterfaces::new(
            self.name.clone(),
            Arc::clone(instance.connector()),
            Arc::clone(&self.context.pushers),
            instance.traversal_state_store().await,
        ));
        state.interfaces = Some(Arc::clone(&interfaces));
        Ok(interfaces)
    }

    fn log_start_failure(&self, err: &CoordinatorError) {
        warn!(
            target: "conduit::coordinator",
            connector = %self.name,
            error = %err,
            "could not start batch; this is normal right after a reconfiguration"
        );
    }

    async fn remove_locked(&self, state: &mut CoordinatorState) {
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            "dropping connector"
        );
        self.reset_batch(state);
        if let Some(instance) = state.instance.take() {
            notify_shutdown(&self.name, instance.connector().as_ref(), true)
                .await;
            if let Err(err) = instance.remove_connector().await {
                warn!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    error = %err,
                    "failed to erase persisted connector state"
                );
            }
            workdir::remove_connector_directory(
                &self.name,
                instance.connector_dir(),
                instance.type_info(),
            )
            .await;
        }
        self.reset_interfaces(state).await;
    }

    async fn create_new_connector(
        &self,
        state: &mut CoordinatorState,
        type_info: Arc<TypeInfo>,
        config: ConfigMap,
        locale: &Locale,
    ) -> Result<Option<ConfigureResponse>> {
        debug_assert!(state.instance.is_none());
        let connector_dir =
            workdir::make_connector_directory(&self.name, &type_info).await?;

        let outcome = self
            .reset_config(
                state,
                connector_dir.clone(),
                Arc::clone(&type_info),
                config,
                locale,
            )
            .await;
        if !matches!(outcome, Ok(None)) {
            workdir::remove_connector_directory(
                &self.name,
                &connector_dir,
                &type_info,
            )
            .await;
        }
        outcome
    }

    /// Validate, build and adopt a configuration. State is only touched once
    /// the new connector exists and its configuration is persisted.
    async fn reset_config(
        &self,
        state: &mut CoordinatorState,
        connector_dir: PathBuf,
        type_info: Arc<TypeInfo>,
        proposed: ConfigMap,
        locale: &Locale,
    ) -> Result<Option<ConfigureResponse>> {
        let mut config = proposed;
        self.inject_context(&mut config, &connector_dir);

        let config = match self
            .validate_config(&connector_dir, &type_info, config, locale)
            .await?
        {
            Validation::Rejected(response) => return Ok(Some(response)),
            Validation::Accepted(config) => config,
        };

        let instance = InstanceInfo::from_new_config(
            &self.name,
            connector_dir,
            type_info,
            config,
            Arc::clone(&self.context.store),
            Arc::clone(&self.checkpoints),
        )
        .await?;

        if let Err(err) = instance.persist_config().await {
            notify_shutdown(&self.name, instance.connector().as_ref(), false)
                .await;
            return Err(err);
        }

        if let Some(previous) = state.instance.as_ref() {
            notify_shutdown(&self.name, previous.connector().as_ref(), false)
                .await;
        }
        info!(
            target: "conduit::coordinator",
            connector = %self.name,
            type_name = %instance.type_info().type_name(),
            "connector configured"
        );
        state.instance = Some(instance);
        Ok(None)
    }

    fn inject_context(&self, config: &mut ConfigMap, connector_dir: &Path) {
        config.insert(PROPERTY_CONNECTOR_NAME.to_owned(), self.name.clone());
        config.insert(
            PROPERTY_CONNECTOR_WORK_DIR.to_owned(),
            connector_dir.display().to_string(),
        );
        config.insert(
            PROPERTY_WORK_DIR.to_owned(),
            self.context.config.work_dir.display().to_string(),
        );
    }

    async fn validate_config(
        &self,
        connector_dir: &Path,
        type_info: &TypeInfo,
        config: ConfigMap,
        locale: &Locale,
    ) -> Result<Validation> {
        let outcome = {
            let factory = ValidationFactory {
                type_info,
                config: &config,
                built: Mutex::new(Vec::new()),
            };
            let outcome = type_info
                .connector_type()
                .validate_config(&config, locale, &factory)
                .await;
            factory.shutdown(&self.name).await;
            outcome
        };

        let response = outcome.map_err(|err| {
            CoordinatorError::instantiation(
                &self.name,
                format!("unexpected validate_config failure: {err}"),
            )
        })?;

        match response {
            Some(response) if response.is_rejection() => {
                warn!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    "configuration rejected"
                );
                Ok(Validation::Rejected(response))
            }
            Some(ConfigureResponse {
                config_data: Some(mut substituted),
                ..
            }) => {
                info!(
                    target: "conduit::coordinator",
                    connector = %self.name,
                    "validation returned a modified configuration"
                );
                self.inject_context(&mut substituted, connector_dir);
                Ok(Validation::Accepted(substituted))
            }
            _ => Ok(Validation::Accepted(config)),
        }
    }
}

/// Shutdown (and optionally delete) notification for connectors that opt
/// in. Failures are logged; a misbehaving connector must not block its own
/// replacement or removal.
async fn notify_shutdown(name: &str, connector: &dyn Connector, delete: bool) {
    let Some(aware) = connector.shutdown_aware() else {
        return;
    };
    if let Err(err) = aware.shutdown().await {
        warn!(
            target: "conduit::coordinator",
            connector = %name,
            error = %err,
            "problem shutting down connector"
        );
    }
    if delete {
        debug!(
            target: "conduit::coordinator",
            connector = %name,
            "deleting connector"
        );
        if let Err(err) = aware.delete().await {
            warn!(
                target: "conduit::coordinator",
                connector = %name,
                error = %err,
                "failed to delete connector"
            );
        }
    }
}

/// Factory handed to `validate_config`; every connector it builds is shut
/// down once validation returns.
struct ValidationFactory<'a> {
    type_info: &'a TypeInfo,
    config: &'a ConfigMap,
    built: Mutex<Vec<Arc<dyn Connector>>>,
}

impl ValidationFactory<'_> {
    async fn shutdown(&self, name: &str) {
        let built = std::mem::take(&mut *self.built.lock().await);
        join_all(built.iter().map(|connector| {
            notify_shutdown(name, connector.as_ref(), false)
        }))
        .await;
    }
}

#[async_trait]
impl<'a> ConnectorFactory for ValidationFactory<'a> {
    async fn make_connector(
        &self,
        config: Option<&ConfigMap>,
    ) -> crate::spi::Result<Arc<dyn Connector>> {
        let config = config.unwrap_or(self.config);
        let connector =
            self.type_info.connector_type().instantiate(config).await?;
        self.built.lock().await.push(Arc::clone(&connector));
        Ok(connector)
    }
}

/// Routes a pool-side batch result back into its coordinator.
struct CoordinatorCompletion {
    coordinator: Weak<ConnectorCoordinator>,
}

#[async_trait]
impl BatchCompletion for CoordinatorCompletion {
    async fn batch_completed(&self, key: BatchKey, result: BatchResult) {
        let Some(coordinator) = self.coordinator.upgrade() else {
            debug!(
                target: "conduit::coordinator",
                key = %key,
                "coordinator dropped before batch finished"
            );
            return;
        };
        if let Err(err) = coordinator.complete_batch(key, None, result).await {
            warn!(
                target: "conduit::coordinator",
                connector = %coordinator.name,
                key = %key,
                error = %err,
                "failed to apply batch result"
            );
        }
    }
}
