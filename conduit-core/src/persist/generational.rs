//! Generation-tagged checkpoint storage.
//!
//! Each connector coordinator owns one [`GenerationalStateStore`] for the
//! lifetime of its connector name. Traversal code never writes checkpoints
//! directly; it holds a [`TraversalStateStore`] bound to the generation that
//! was current when it was handed out. Advancing the generation turns every
//! previously bound handle into a reader whose writes are dropped, so a batch
//! that outlives a reconfiguration or restart cannot clobber newer state.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::PersistentStore;
use crate::error::Result;

pub struct GenerationalStateStore {
    name: String,
    backing: Arc<dyn PersistentStore>,
    // Writers hold the read side for the duration of the backing write so
    // `advance` cannot interleave between the generation check and the write.
    generation: RwLock<u64>,
}

impl fmt::Debug for GenerationalStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let generation = self
            .generation
            .try_read()
            .map(|guard| *guard)
            .ok();
        f.debug_struct("GenerationalStateStore")
            .field("name", &self.name)
            .field("generation", &generation)
            .finish()
    }
}

impl GenerationalStateStore {
    pub fn new(
        name: impl Into<String>,
        backing: Arc<dyn PersistentStore>,
    ) -> Self {
        Self {
            name: name.into(),
            backing,
            generation: RwLock::new(0),
        }
    }

    pub async fn generation(&self) -> u64 {
        *self.generation.read().await
    }

    /// Start a new generation. Waits for in-flight writes of the previous
    /// generation to land first.
    pub async fn advance(&self) -> u64 {
        let mut guard = self.generation.write().await;
        *guard += 1;
        debug!(
            target: "conduit::checkpoint",
            connector = %self.name,
            generation = *guard,
            "checkpoint generation advanced"
        );
        *guard
    }

    /// Hand out a handle bound to the current generation.
    pub async fn bind(self: &Arc<Self>) -> TraversalStateStore {
        let generation = self.generation().await;
        TraversalStateStore {
            store: Arc::clone(self),
            generation,
        }
    }

    pub async fn state(&self) -> Result<Option<String>> {
        self.backing.connector_state(&self.name).await
    }

    /// Write `state` (or clear it with `None`) if `generation` is still
    /// current. Returns whether the write took effect.
    pub async fn store_state(
        &self,
        generation: u64,
        state: Option<&str>,
    ) -> Result<bool> {
        let current = self.generation.read().await;
        if *current != generation {
            debug!(
                target: "conduit::checkpoint",
                connector = %self.name,
                stale = generation,
                current = *current,
                "dropping checkpoint write from superseded generation"
            );
            return Ok(false);
        }

        match state {
            Some(state) => {
                self.backing.store_connector_state(&self.name, state).await?
            }
            None => self.backing.remove_connector_state(&self.name).await?,
        }
        Ok(true)
    }
}

/// Checkpoint accessor bound to one generation.
#[derive(Clone)]
pub struct TraversalStateStore {
    store: Arc<GenerationalStateStore>,
    generation: u64,
}

impl fmt::Debug for TraversalStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalStateStore")
            .field("name", &self.store.name)
            .field("generation", &self.generation)
            .finish()
    }
}

impl TraversalStateStore {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn traversal_state(&self) -> Result<Option<String>> {
        self.store.state().await
    }

    pub async fn store_traversal_state(
        &self,
        state: Option<&str>,
    ) -> Result<bool> {
        self.store.store_state(self.generation, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::InMemoryStore;

    fn store() -> Arc<GenerationalStateStore> {
        Arc::new(GenerationalStateStore::new(
            "c1",
            Arc::new(InMemoryStore::new()),
        ))
    }

    #[tokio::test]
    async fn stale_handle_cannot_overwrite_newer_generation() {
        let store = store();
        let old = store.bind().await;
        assert!(old.store_traversal_state(Some("ck-old")).await.unwrap());

        store.advance().await;
        let fresh = store.bind().await;
        assert!(fresh.store_traversal_state(Some("ck-new")).await.unwrap());

        assert!(!old.store_traversal_state(Some("ck-late")).await.unwrap());
        assert_eq!(old.generation() + 1, fresh.generation());
        assert_eq!(
            fresh.traversal_state().await.unwrap().as_deref(),
            Some("ck-new")
        );
    }

    #[tokio::test]
    async fn clearing_removes_the_checkpoint() {
        let store = store();
        let handle = store.bind().await;
        handle.store_traversal_state(Some("ck")).await.unwrap();
        handle.store_traversal_state(None).await.unwrap();
        assert_eq!(store.state().await.unwrap(), None);
    }
}
