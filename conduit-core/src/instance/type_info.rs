use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::spi::ConnectorType;

/// File name of the instance prototype extracted into each connector's
/// working directory.
pub const INSTANCE_PROTOTYPE_FILE: &str = "connectorInstance.toml";

/// Immutable descriptor of one connector type.
#[derive(Clone)]
pub struct TypeInfo {
    type_name: String,
    connector_type: Arc<dyn ConnectorType>,
    type_dir: PathBuf,
    instance_prototype: Option<String>,
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_name", &self.type_name)
            .field("type_dir", &self.type_dir)
            .field("has_prototype", &self.instance_prototype.is_some())
            .finish()
    }
}

impl TypeInfo {
    pub fn new(
        type_name: impl Into<String>,
        connector_type: Arc<dyn ConnectorType>,
        type_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            connector_type,
            type_dir: type_dir.into(),
            instance_prototype: None,
        }
    }

    /// Attach the prototype written to [`INSTANCE_PROTOTYPE_FILE`] when a
    /// connector of this type gets a fresh working directory.
    pub fn with_instance_prototype(
        mut self,
        prototype: impl Into<String>,
    ) -> Self {
        self.instance_prototype = Some(prototype.into());
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn connector_type(&self) -> &Arc<dyn ConnectorType> {
        &self.connector_type
    }

    pub fn type_dir(&self) -> &Path {
        &self.type_dir
    }

    pub fn instance_prototype(&self) -> Option<&str> {
        self.instance_prototype.as_deref()
    }

    pub fn connector_dir(&self, connector_name: &str) -> PathBuf {
        self.type_dir.join(connector_name)
    }

    pub fn same_type(&self, other: &TypeInfo) -> bool {
        self.type_name == other.type_name
    }
}
