use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::PersistentStore;
use crate::error::Result;
use crate::spi::ConfigMap;

#[derive(Clone, Debug, Default)]
struct StoredConnector {
    config: Option<ConfigMap>,
    schedule: Option<String>,
    state: Option<String>,
}

impl StoredConnector {
    fn is_empty(&self) -> bool {
        self.config.is_none() && self.schedule.is_none() && self.state.is_none()
    }
}

/// Process-local [`PersistentStore`]. Contents do not survive a restart.
#[derive(Default)]
pub struct InMemoryStore {
    connectors: RwLock<HashMap<String, StoredConnector>>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.connectors.try_read() {
            Ok(guard) => f
                .debug_struct("InMemoryStore")
                .field("connectors", &guard.len())
                .finish(),
            Err(_) => f
                .debug_struct("InMemoryStore")
                .field("connectors", &"<locked>")
                .finish(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, name: &str, apply: F)
    where
        F: FnOnce(&mut StoredConnector),
    {
        let mut guard = self.connectors.write().await;
        let entry = guard.entry(name.to_owned()).or_default();
        apply(entry);
        if entry.is_empty() {
            guard.remove(name);
        }
    }

    async fn read<T, F>(&self, name: &str, select: F) -> Option<T>
    where
        F: FnOnce(&StoredConnector) -> Option<T>,
    {
        self.connectors.read().await.get(name).and_then(select)
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn connector_config(&self, name: &str) -> Result<Option<ConfigMap>> {
        Ok(self.read(name, |stored| stored.config.clone()).await)
    }

    async fn store_connector_config(
        &self,
        name: &str,
        config: &ConfigMap,
    ) -> Result<()> {
        let config = config.clone();
        self.update(name, |stored| stored.config = Some(config)).await;
        Ok(())
    }

    async fn remove_connector_config(&self, name: &str) -> Result<()> {
        self.update(name, |stored| stored.config = None).await;
        Ok(())
    }

    async fn connector_schedule(&self, name: &str) -> Result<Option<String>> {
        Ok(self.read(name, |stored| stored.schedule.clone()).await)
    }

    async fn store_connector_schedule(
        &self,
        name: &str,
        schedule: &str,
    ) -> Result<()> {
        let schedule = schedule.to_owned();
        self.update(name, |stored| stored.schedule = Some(schedule)).await;
        Ok(())
    }

    async fn remove_connector_schedule(&self, name: &str) -> Result<()> {
        self.update(name, |stored| stored.schedule = None).await;
        Ok(())
    }

    async fn connector_state(&self, name: &str) -> Result<Option<String>> {
        Ok(self.read(name, |stored| stored.state.clone()).await)
    }

    async fn store_connector_state(
        &self,
        name: &str,
        state: &str,
    ) -> Result<()> {
        let state = state.to_owned();
        self.update(name, |stored| stored.state = Some(state)).await;
        Ok(())
    }

    async fn remove_connector_state(&self, name: &str) -> Result<()> {
        self.update(name, |stored| stored.state = None).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removing_every_slot_forgets_the_connector() {
        let store = InMemoryStore::new();
        let mut config = ConfigMap::new();
        config.insert("k".into(), "v".into());

        store.store_connector_config("c1", &config).await.unwrap();
        store.store_connector_state("c1", "ck").await.unwrap();
        assert_eq!(store.connectors.read().await.len(), 1);

        store.remove_connector_config("c1").await.unwrap();
        assert_eq!(
            store.connector_state("c1").await.unwrap().as_deref(),
            Some("ck")
        );

        store.remove_connector_state("c1").await.unwrap();
        assert!(store.connectors.read().await.is_empty());
    }
}
