//! Service provider interface implemented by connector authors.
//!
//! A connector plugs an external content repository into the coordinator. The
//! coordinator never inspects a connector beyond these traits: it validates a
//! configuration through [`ConnectorType`], builds the live [`Connector`], and
//! reaches traversal and security capabilities through a [`Session`].

pub mod connector;
pub mod security;
pub mod traversal;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use connector::{
    ConfigureResponse, Connector, ConnectorFactory, ConnectorType, Session,
    ShutdownAware,
};
pub use security::{
    AuthenticationIdentity, AuthenticationManager, AuthenticationResponse,
    AuthorizationManager, AuthorizationResponse,
};
pub use traversal::{Document, DocumentList, TraversalManager};

/// Validated connector configuration. Ordered so persisted and logged forms
/// are stable.
pub type ConfigMap = BTreeMap<String, String>;

/// Failures raised by connector implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Repository login failed: {0}")]
    Login(String),

    #[error("Document rejected: {0}")]
    Document(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Language tag used when rendering configuration forms and messages.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Locale(pub String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
