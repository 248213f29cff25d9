//! Per-connector configuration state owned by a coordinator.

pub mod instance_info;
pub mod type_info;
pub mod workdir;

pub use instance_info::InstanceInfo;
pub use type_info::{INSTANCE_PROTOTYPE_FILE, TypeInfo};

/// Configuration property carrying the connector's name.
pub const PROPERTY_CONNECTOR_NAME: &str = "connectorName";
/// Configuration property carrying the connector's private working directory.
pub const PROPERTY_CONNECTOR_WORK_DIR: &str = "connectorWorkDir";
/// Configuration property carrying the shared working directory.
pub const PROPERTY_WORK_DIR: &str = "workDir";
