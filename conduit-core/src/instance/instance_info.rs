use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::TypeInfo;
use crate::error::{CoordinatorError, Result};
use crate::persist::{
    GenerationalStateStore, PersistentStore, TraversalStateStore,
};
use crate::spi::{ConfigMap, Connector};

/// One configured connector: its validated configuration, the live
/// connector built from it, and access to its persisted schedule and
/// checkpoint.
///
/// Replaced wholesale on reconfiguration; never mutated into a different
/// configuration in place.
pub struct InstanceInfo {
    name: String,
    connector_dir: PathBuf,
    type_info: Arc<TypeInfo>,
    connector: Arc<dyn Connector>,
    config: ConfigMap,
    store: Arc<dyn PersistentStore>,
    checkpoints: Arc<GenerationalStateStore>,
}

impl fmt::Debug for InstanceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceInfo")
            .field("name", &self.name)
            .field("connector_dir", &self.connector_dir)
            .field("type_name", &self.type_info.type_name())
            .field("config_keys", &self.config.len())
            .field("checkpoints", &self.checkpoints)
            .finish()
    }
}

impl InstanceInfo {
    /// Build a live connector from a configuration that already passed
    /// validation. Nothing is persisted until [`Self::persist_config`].
    pub async fn from_new_config(
        name: &str,
        connector_dir: PathBuf,
        type_info: Arc<TypeInfo>,
        config: ConfigMap,
        store: Arc<dyn PersistentStore>,
        checkpoints: Arc<GenerationalStateStore>,
    ) -> Result<Self> {
        let connector = type_info
            .connector_type()
            .instantiate(&config)
            .await
            .map_err(|err| {
                CoordinatorError::instantiation(name, err.to_string())
            })?;

        Ok(Self {
            name: name.to_owned(),
            connector_dir,
            type_info,
            connector,
            config,
            store,
            checkpoints,
        })
    }

    /// Rebuild a connector from the configuration persisted by an earlier
    /// instance of the same name.
    pub async fn from_stored_config(
        name: &str,
        type_info: Arc<TypeInfo>,
        store: Arc<dyn PersistentStore>,
        checkpoints: Arc<GenerationalStateStore>,
    ) -> Result<Self> {
        let config = store
            .connector_config(name)
            .await?
            .ok_or_else(|| CoordinatorError::not_found(name))?;
        let connector_dir = type_info.connector_dir(name);
        debug!(
            target: "conduit::instance",
            connector = %name,
            dir = %connector_dir.display(),
            "restoring connector from stored configuration"
        );
        Self::from_new_config(
            name,
            connector_dir,
            type_info,
            config,
            store,
            checkpoints,
        )
        .await
    }

    pub fn connector_dir(&self) -> &Path {
        &self.connector_dir
    }

    pub fn type_info(&self) -> &Arc<TypeInfo> {
        &self.type_info
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn connector_config(&self) -> &ConfigMap {
        &self.config
    }

    pub async fn persist_config(&self) -> Result<()> {
        self.store
            .store_connector_config(&self.name, &self.config)
            .await
    }

    pub async fn connector_schedule(&self) -> Result<Option<String>> {
        self.store.connector_schedule(&self.name).await
    }

    pub async fn set_connector_schedule(
        &self,
        schedule: Option<&str>,
    ) -> Result<()> {
        match schedule {
            Some(schedule) => {
                self.store
                    .store_connector_schedule(&self.name, schedule)
                    .await
            }
            None => self.store.remove_connector_schedule(&self.name).await,
        }
    }

    pub async fn connector_state(&self) -> Result<Option<String>> {
        self.checkpoints.state().await
    }

    /// Write the checkpoint at the current generation.
    pub async fn set_connector_state(
        &self,
        state: Option<&str>,
    ) -> Result<bool> {
        let handle = self.checkpoints.bind().await;
        handle.store_traversal_state(state).await
    }

    pub async fn traversal_state_store(&self) -> TraversalStateStore {
        self.checkpoints.bind().await
    }

    /// Erase everything persisted for this connector. Every slot is
    /// attempted; the first failure is returned.
    pub async fn remove_connector(&self) -> Result<()> {
        let state = self.store.remove_connector_state(&self.name).await;
        let schedule = self.store.remove_connector_schedule(&self.name).await;
        let config = self.store.remove_connector_config(&self.name).await;
        state.and(schedule).and(config)
    }
}
