//! Replica placement policies.
//!
//! The engine records which nodes hold a chunk but does not replicate
//! anything itself. Distribution is delegated to a [`ReplicaPlacement`].

use std::collections::BTreeSet;

use dcs_chunks::ContentId;

/// Decides which nodes hold copies of a chunk.
pub trait ReplicaPlacement: Send + Sync {
    /// Node ids for `chunk_id`, at most `replicas` of them. May be empty.
    fn place(&self, chunk_id: &ContentId, replicas: u32) -> BTreeSet<String>;
}

/// Records no placement at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlacement;

impl ReplicaPlacement for NoPlacement {
    fn place(&self, _chunk_id: &ContentId, _replicas: u32) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Every chunk lives on the local node only, regardless of the target count.
#[derive(Debug, Clone)]
pub struct LocalPlacement {
    node_id: String,
}

impl LocalPlacement {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl ReplicaPlacement for LocalPlacement {
    fn place(&self, _chunk_id: &ContentId, replicas: u32) -> BTreeSet<String> {
        if replicas == 0 {
            return BTreeSet::new();
        }
        BTreeSet::from([self.node_id.clone()])
    }
}
