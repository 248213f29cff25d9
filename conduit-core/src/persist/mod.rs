//! Durable per-connector state.
//!
//! [`PersistentStore`] is the contract a backing store must satisfy; the
//! generational wrapper in [`generational`] layers stale-write rejection on
//! top of its checkpoint slot.

pub mod generational;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::spi::ConfigMap;

pub use generational::{GenerationalStateStore, TraversalStateStore};
pub use memory::InMemoryStore;

/// Storage for a connector's configuration, schedule and checkpoint, keyed
/// by connector name.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn connector_config(&self, name: &str) -> Result<Option<ConfigMap>>;

    async fn store_connector_config(
        &self,
        name: &str,
        config: &ConfigMap,
    ) -> Result<()>;

    async fn remove_connector_config(&self, name: &str) -> Result<()>;

    async fn connector_schedule(&self, name: &str) -> Result<Option<String>>;

    async fn store_connector_schedule(
        &self,
        name: &str,
        schedule: &str,
    ) -> Result<()>;

    async fn remove_connector_schedule(&self, name: &str) -> Result<()>;

    async fn connector_state(&self, name: &str) -> Result<Option<String>>;

    async fn store_connector_state(
        &self,
        name: &str,
        state: &str,
    ) -> Result<()>;

    async fn remove_connector_state(&self, name: &str) -> Result<()>;
}
