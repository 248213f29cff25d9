use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Result;

/// A content unit produced by traversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub docid: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn new(docid: impl Into<String>) -> Self {
        Self {
            docid: docid.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.properties
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }
}

/// Cursor over the documents of one traversal call.
#[async_trait]
pub trait DocumentList: Send {
    async fn next_document(&mut self) -> Result<Option<Document>>;

    /// Checkpoint covering every document returned so far. `None` leaves
    /// the stored checkpoint untouched.
    async fn checkpoint(&mut self) -> Result<Option<String>>;
}

#[async_trait]
pub trait TraversalManager: Send + Sync {
    /// Begin from the start of the repository. `None` means there is
    /// currently nothing to traverse.
    async fn start_traversal(&self) -> Result<Option<Box<dyn DocumentList>>>;

    async fn resume_traversal(
        &self,
        checkpoint: &str,
    ) -> Result<Option<Box<dyn DocumentList>>>;

    /// Advisory upper bound on documents the next list should hold.
    fn set_batch_hint(&self, _batch_hint: usize) {}
}
