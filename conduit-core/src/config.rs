use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Process-wide knobs shared by every connector coordinator.
///
/// All fields carry defaults so a deployment can supply only the values it
/// wants to change.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Common working directory handed to every connector through the
    /// `workDir` configuration property.
    pub work_dir: PathBuf,
    /// Batch hint used by schedulers that do not compute their own.
    pub default_batch_hint: usize,
    /// Thread pool sizing for traversal batches.
    pub pool: PoolConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("work"),
            default_batch_hint: 500,
            pool: PoolConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of traversal batches running at once across all
    /// connectors. Submitted batches beyond this wait for a free slot.
    pub max_concurrent_batches: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_batches: 4,
        }
    }
}
