use thiserror::Error;

use crate::spi::RepositoryError;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Connector not found: {0}")]
    ConnectorNotFound(String),

    #[error("Connector already exists: {0}")]
    ConnectorAlreadyExists(String),

    #[error("Failed to instantiate connector {name}: {reason}")]
    Instantiation { name: String, reason: String },

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Raised by [`PersistentStore`](crate::persist::PersistentStore)
    /// backends that cannot read or write a slot.
    #[error("Persistent store error: {0}")]
    Store(String),

    #[error("Thread pool has been shut down")]
    PoolShutdown,
}

impl CoordinatorError {
    pub fn instantiation(
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Instantiation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::ConnectorNotFound(format!(
            "connector instance {name} not available"
        ))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ConnectorNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
