use std::sync::Arc;

use strata_chainhead_types::{BlockHash, RuntimeSpec};

/// Chain update broadcast to subscribers of a [`ChainHeadTracker`](crate::ChainHeadTracker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainHeadNotification {
    /// A block got pinned. Carries the runtime it introduced, if any.
    NewBlock {
        hash: BlockHash,
        runtime: Option<Arc<RuntimeSpec>>,
    },
    /// The best block changed. Carries the runtime in effect at it.
    BestBlock {
        hash: BlockHash,
        runtime: Option<Arc<RuntimeSpec>>,
    },
    /// The finalized head advanced. Carries the finalized runtime.
    FinalizedBlock {
        hash: BlockHash,
        runtime: Option<Arc<RuntimeSpec>>,
    },
}

impl ChainHeadNotification {
    pub fn hash(&self) -> &BlockHash {
        match self {
            ChainHeadNotification::NewBlock { hash, .. }
            | ChainHeadNotification::BestBlock { hash, .. }
            | ChainHeadNotification::FinalizedBlock { hash, .. } => hash,
        }
    }
}
