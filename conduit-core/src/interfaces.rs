//! Lazily built view over a connector's session.
//!
//! A [`ConnectorInterfaces`] is tied to one live connector and one checkpoint
//! generation. The coordinator throws it away whenever either changes and
//! builds a fresh one on next use, so traversers never outlive the
//! configuration they were created for.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{CoordinatorError, Result};
use crate::persist::TraversalStateStore;
use crate::pusher::PusherFactory;
use crate::spi::{
    AuthenticationManager, AuthorizationManager, Connector, Session,
};
use crate::traversal::{QueryTraverser, Traverser};

pub struct ConnectorInterfaces {
    connector_name: String,
    connector: Arc<dyn Connector>,
    pushers: Arc<dyn PusherFactory>,
    state_store: TraversalStateStore,
    session: OnceCell<Arc<dyn Session>>,
    traverser: OnceCell<Arc<QueryTraverser>>,
}

impl fmt::Debug for ConnectorInterfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorInterfaces")
            .field("connector_name", &self.connector_name)
            .field("generation", &self.state_store.generation())
            .field("logged_in", &self.session.initialized())
            .field("has_traverser", &self.traverser.initialized())
            .finish()
    }
}

impl ConnectorInterfaces {
    pub fn new(
        connector_name: impl Into<String>,
        connector: Arc<dyn Connector>,
        pushers: Arc<dyn PusherFactory>,
        state_store: TraversalStateStore,
    ) -> Self {
        Self {
            connector_name: connector_name.into(),
            connector,
            pushers,
            state_store,
            session: OnceCell::new(),
            traverser: OnceCell::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.state_store.generation()
    }

    pub fn state_store(&self) -> &TraversalStateStore {
        &self.state_store
    }

    async fn session(&self) -> Result<&Arc<dyn Session>> {
        self.session
            .get_or_try_init(|| async {
                debug!(
                    target: "conduit::interfaces",
                    connector = %self.connector_name,
                    "logging in to connector"
                );
                let session = self.connector.login().await?;
                Ok::<_, CoordinatorError>(session)
            })
            .await
    }

    pub async fn authentication_manager(
        &self,
    ) -> Result<Option<Arc<dyn AuthenticationManager>>> {
        Ok(self.session().await?.authentication_manager())
    }

    pub async fn authorization_manager(
        &self,
    ) -> Result<Option<Arc<dyn AuthorizationManager>>> {
        Ok(self.session().await?.authorization_manager())
    }

    pub async fn traverser(&self) -> Result<Arc<dyn Traverser>> {
        let traverser = self
            .traverser
            .get_or_try_init(|| async {
                let manager = self.session().await?.traversal_manager()?;
                Ok::<_, CoordinatorError>(Arc::new(
                    QueryTraverser::new(
                        self.connector_name.clone(),
                        manager,
                        Arc::clone(&self.pushers),
                        self.state_store.clone(),
                    ),
                ))
            })
            .await?;
        Ok(Arc::clone(traverser) as Arc<dyn Traverser>)
    }
}
