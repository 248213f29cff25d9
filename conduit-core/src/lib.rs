//! # Conduit Core
//!
//! Lifecycle management for content-repository connectors.
//!
//! ## Overview
//!
//! A connector plugs an external repository into a document feed. This crate
//! owns everything between a connector implementation and the scheduler that
//! drives it:
//!
//! - **Connector SPI**: traits connector authors implement ([`spi`])
//! - **Coordinator**: one serialized owner per connector name that creates,
//!   reconfigures, removes and shuts down the connector ([`coordinator`])
//! - **Batches**: bounded, cancelable traversal runs keyed so that stale
//!   completions are ignored ([`batch`], [`traversal`])
//! - **Checkpoints**: generation-tagged persistence that drops writes from
//!   superseded traversals ([`persist`])
//! - **Working directories**: per-connector directories seeded from the
//!   connector type's prototype file ([`instance`])
//!
//! ## Architecture
//!
//! - [`coordinator`]: [`ConnectorCoordinator`] and its shared
//!   [`CoordinatorContext`]
//! - [`instance`]: type and instance records plus working-directory helpers
//! - [`interfaces`]: lazily built session, security managers and traverser
//! - [`traversal`]: [`Traverser`] contract and the [`QueryTraverser`]
//! - [`batch`]: batch keys, cancelable batches and the tokio thread pool
//! - [`persist`]: [`PersistentStore`] contract, in-memory store and the
//!   generational checkpoint wrapper
//! - [`pusher`]: the document feed contract
//! - [`config`]: serde-backed runtime configuration
//! - [`error`]: [`CoordinatorError`]

#![allow(missing_docs)]

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod instance;
pub mod interfaces;
pub mod persist;
pub mod pusher;
pub mod spi;
pub mod traversal;

pub use batch::{
    BatchCompletion, BatchKey, BatchResultRecorder, Cancelable,
    CancelableBatch, TaskHandle, ThreadPool, TokioThreadPool,
};
pub use config::{CoordinatorConfig, PoolConfig};
pub use coordinator::{ConnectorCoordinator, CoordinatorContext};
pub use error::{CoordinatorError, Result};
pub use instance::{InstanceInfo, TypeInfo};
pub use interfaces::ConnectorInterfaces;
pub use persist::{
    GenerationalStateStore, InMemoryStore, PersistentStore,
    TraversalStateStore,
};
pub use pusher::{PushError, Pusher, PusherFactory, PusherStatus};
pub use traversal::{
    BatchResult, QueryTraverser, TraversalDelayPolicy, Traverser,
};
