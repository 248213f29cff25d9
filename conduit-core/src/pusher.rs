//! Contract for the downstream feed that traversal pushes documents into.
//!
//! The feed transport itself lives outside this crate; traversal only needs
//! to hand over documents, flush at the end of a batch, and discard buffered
//! work when a batch is canceled.
//!
//! Every batch opens its own [`Pusher`] through the process-wide
//! [`PusherFactory`], so one connector's flush or cancel never touches
//! documents buffered for another.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spi::Document;

/// Feed health reported after each accepted document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PusherStatus {
    Ok,
    /// The feed will not accept more documents in this batch.
    Disabled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    #[error("Feed rejected document {docid}: {reason}")]
    Rejected { docid: String, reason: String },

    #[error("Feed unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Pusher: Send + Sync {
    async fn take(
        &self,
        document: Document,
    ) -> Result<PusherStatus, PushError>;

    async fn flush(&self) -> Result<(), PushError>;

    /// Drop buffered documents without sending them.
    async fn cancel(&self);
}

/// Opens a feed for one traversal batch of the named connector.
pub trait PusherFactory: Send + Sync {
    fn new_pusher(
        &self,
        connector_name: &str,
    ) -> Result<Arc<dyn Pusher>, PushError>;
}
