//! Configuration loading and logging setup for processes that host
//! connector coordinators.
//!
//! [`ManagerConfig`] wraps the core [`CoordinatorConfig`] with the settings
//! only a hosting process cares about. [`init_tracing`] installs the shared
//! subscriber.

#![allow(missing_docs)]

pub mod loader;
pub mod telemetry;

pub use conduit_core::config::{CoordinatorConfig, PoolConfig};
pub use loader::{ConfigSource, Format, ManagerConfig};
pub use telemetry::init_tracing;
