//! Local model of the blocks the node keeps pinned for a follow session.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use strata_chainhead_types::{BlockHash, RuntimeSpec};
use tracing::{debug, warn};

use crate::errors::{ChainHeadError, Result};

#[derive(Debug, Clone)]
struct PinnedBlock {
    parent: Option<BlockHash>,
    /// Set only on blocks that introduced a runtime.
    runtime: Option<Arc<RuntimeSpec>>,
}

/// Result of applying a `finalized` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Finalization {
    pub(crate) finalized: BlockHash,
    pub(crate) runtime: Option<Arc<RuntimeSpec>>,
    /// Blocks dropped from the model that must be unpinned on the node.
    pub(crate) unpin: Vec<BlockHash>,
}

/// Pinned blocks plus the best and finalized pointers.
///
/// Both pointers always name a pinned block.
#[derive(Debug, Clone)]
pub(crate) struct PinnedChain {
    blocks: HashMap<BlockHash, PinnedBlock>,
    /// Finalized blocks still pinned, oldest first. The last one is the
    /// finalized head.
    finalized_pinned: Vec<BlockHash>,
    best: BlockHash,
    finalized: BlockHash,
    finalized_runtime: Option<Arc<RuntimeSpec>>,
}

impl PinnedChain {
    /// Builds the model from the `initialized` event.
    ///
    /// Each hash is taken to be the parent of the next one.
    pub(crate) fn from_initialized(
        finalized_hashes: Vec<BlockHash>,
        runtime: Option<RuntimeSpec>,
    ) -> Result<Self> {
        let Some(head) = finalized_hashes.last().cloned() else {
            return Err(ChainHeadError::InvalidEvent(
                "initialized event without finalized hashes".to_string(),
            ));
        };
        let runtime = runtime.map(Arc::new);

        let mut blocks = HashMap::with_capacity(finalized_hashes.len());
        let mut parent = None;
        for hash in &finalized_hashes {
            let block_runtime = if *hash == head { runtime.clone() } else { None };
            blocks.insert(
                hash.clone(),
                PinnedBlock {
                    parent: parent.replace(hash.clone()),
                    runtime: block_runtime,
                },
            );
        }

        Ok(Self {
            blocks,
            finalized_pinned: finalized_hashes,
            best: head.clone(),
            finalized: head,
            finalized_runtime: runtime,
        })
    }

    pub(crate) fn best(&self) -> &BlockHash {
        &self.best
    }

    pub(crate) fn finalized(&self) -> &BlockHash {
        &self.finalized
    }

    pub(crate) fn finalized_runtime(&self) -> Option<Arc<RuntimeSpec>> {
        self.finalized_runtime.clone()
    }

    pub(crate) fn is_pinned(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub(crate) fn pinned_hashes(&self) -> Vec<BlockHash> {
        let mut hashes: Vec<_> = self.blocks.keys().cloned().collect();
        hashes.sort();
        hashes
    }

    /// Pins a block reported by `newBlock` and returns the runtime it
    /// introduced, if any.
    pub(crate) fn add_block(
        &mut self,
        hash: BlockHash,
        parent: BlockHash,
        runtime: Option<RuntimeSpec>,
    ) -> Option<Arc<RuntimeSpec>> {
        if !self.blocks.contains_key(&parent) {
            warn!(%hash, %parent, "new block has an unpinned parent");
        }

        let runtime = runtime.map(Arc::new);
        let block = PinnedBlock {
            parent: Some(parent),
            runtime: runtime.clone(),
        };
        if self.blocks.insert(hash.clone(), block).is_some() {
            warn!(%hash, "block reported twice, replacing it");
        }
        runtime
    }

    /// Moves the best pointer.
    pub(crate) fn set_best(&mut self, hash: BlockHash) -> Result<()> {
        if !self.blocks.contains_key(&hash) {
            return Err(ChainHeadError::BlockNotPinned(hash));
        }
        self.best = hash;
        Ok(())
    }

    /// Runtime in effect at `hash`: the nearest runtime on the way back
    /// through pinned ancestors, else the finalized runtime.
    pub(crate) fn runtime_at(&self, hash: &BlockHash) -> Option<Arc<RuntimeSpec>> {
        let mut cursor = Some(hash);
        // Bounded by the pinned set, so a malformed parent loop still ends.
        for _ in 0..=self.blocks.len() {
            let Some(block) = cursor.and_then(|h| self.blocks.get(h)) else {
                break;
            };
            if let Some(runtime) = &block.runtime {
                return Some(runtime.clone());
            }
            cursor = block.parent.as_ref();
        }
        self.finalized_runtime.clone()
    }

    pub(crate) fn best_runtime(&self) -> Option<Arc<RuntimeSpec>> {
        self.runtime_at(&self.best)
    }

    /// Applies a `finalized` event.
    ///
    /// Unpins the pruned blocks and every finalized block older than the new
    /// finalized head, keeping only hashes that are actually pinned. If the
    /// best block got unpinned it falls back to the finalized head.
    pub(crate) fn finalize(
        &mut self,
        finalized_hashes: Vec<BlockHash>,
        pruned_hashes: Vec<BlockHash>,
    ) -> Result<Finalization> {
        let Some(head) = finalized_hashes.last().cloned() else {
            return Err(ChainHeadError::InvalidEvent(
                "finalized event without finalized hashes".to_string(),
            ));
        };
        if !self.blocks.contains_key(&head) {
            return Err(ChainHeadError::BlockNotPinned(head));
        }

        // Resolve before unpinning, the head's ancestors may be going away.
        let runtime = self.runtime_at(&head);
        if runtime != self.finalized_runtime {
            debug!(%head, "finalized runtime changed");
            self.finalized_runtime = runtime.clone();
        }
        self.finalized = head.clone();

        let mut unpin = Vec::new();
        let mut seen = HashSet::new();
        let superseded = self.finalized_pinned.drain(..).chain(finalized_hashes);
        for hash in pruned_hashes.into_iter().chain(superseded) {
            if hash == head || !seen.insert(hash.clone()) {
                continue;
            }
            if self.blocks.remove(&hash).is_some() {
                unpin.push(hash);
            } else {
                warn!(%hash, "asked to release a block that is not pinned");
            }
        }
        self.finalized_pinned = vec![head.clone()];

        if !self.blocks.contains_key(&self.best) {
            warn!(best = %self.best, %head, "best block was released, falling back to finalized");
            self.best = head.clone();
        }

        Ok(Finalization {
            finalized: head,
            runtime,
            unpin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;

    fn h(s: &str) -> BlockHash {
        BlockHash::from(s)
    }

    fn spec(version: u32) -> RuntimeSpec {
        RuntimeSpec {
            spec_name: "test".to_string(),
            impl_name: "test-node".to_string(),
            spec_version: version,
            impl_version: 0,
            transaction_version: None,
            apis: BTreeMap::new(),
        }
    }

    fn chain() -> PinnedChain {
        PinnedChain::from_initialized(vec![h("0x1"), h("0x2"), h("0x3")], Some(spec(1))).unwrap()
    }

    #[test]
    fn test_initialized_sets_pointers() {
        let chain = chain();
        assert_eq!(chain.best(), &h("0x3"));
        assert_eq!(chain.finalized(), &h("0x3"));
        assert_eq!(chain.pinned_hashes(), vec![h("0x1"), h("0x2"), h("0x3")]);
        assert_eq!(chain.finalized_runtime().unwrap().spec_version, 1);
    }

    #[test]
    fn test_initialized_requires_hashes() {
        let err = PinnedChain::from_initialized(vec![], None).unwrap_err();
        assert!(matches!(err, ChainHeadError::InvalidEvent(_)));
    }

    #[test]
    fn test_best_runtime_walks_ancestors() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), Some(spec(2)));
        chain.add_block(h("0x5"), h("0x4"), None);
        chain.set_best(h("0x5")).unwrap();

        assert_eq!(chain.best_runtime().unwrap().spec_version, 2);
        assert_eq!(chain.finalized_runtime().unwrap().spec_version, 1);
    }

    #[test]
    fn test_set_best_requires_pinned_block() {
        let mut chain = chain();
        let err = chain.set_best(h("0x9")).unwrap_err();
        assert!(matches!(err, ChainHeadError::BlockNotPinned(_)));
        assert_eq!(chain.best(), &h("0x3"));
    }

    #[test]
    fn test_finalize_releases_superseded_and_pruned() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), None);
        chain.add_block(h("0x5"), h("0x4"), None);
        chain.add_block(h("0x4b"), h("0x3"), None);
        chain.set_best(h("0x5")).unwrap();

        let fin = chain
            .finalize(vec![h("0x4"), h("0x5")], vec![h("0x4b")])
            .unwrap();

        assert_eq!(fin.finalized, h("0x5"));
        assert_eq!(
            fin.unpin,
            vec![h("0x4b"), h("0x1"), h("0x2"), h("0x3"), h("0x4")]
        );
        assert_eq!(chain.pinned_hashes(), vec![h("0x5")]);
        assert_eq!(chain.best(), &h("0x5"));
    }

    #[test]
    fn test_finalize_keeps_best_descendants() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), None);
        chain.add_block(h("0x5"), h("0x4"), None);
        chain.set_best(h("0x5")).unwrap();

        let fin = chain.finalize(vec![h("0x4")], vec![]).unwrap();

        assert_eq!(fin.unpin, vec![h("0x1"), h("0x2"), h("0x3")]);
        assert_eq!(chain.best(), &h("0x5"));
        assert!(chain.is_pinned(&h("0x5")));
    }

    #[test]
    fn test_finalize_updates_runtime_from_ancestor() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), Some(spec(7)));
        chain.add_block(h("0x5"), h("0x4"), None);

        let fin = chain.finalize(vec![h("0x4"), h("0x5")], vec![]).unwrap();

        assert_eq!(fin.runtime.as_ref().unwrap().spec_version, 7);
        assert_eq!(chain.finalized_runtime().unwrap().spec_version, 7);
        // The block carrying the runtime is gone, the cache still answers.
        assert!(!chain.is_pinned(&h("0x4")));
        assert_eq!(chain.runtime_at(&h("0x5")).unwrap().spec_version, 7);
    }

    #[test]
    fn test_finalize_pruned_best_falls_back() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), None);
        chain.add_block(h("0x4b"), h("0x3"), None);
        chain.set_best(h("0x4b")).unwrap();

        chain.finalize(vec![h("0x4")], vec![h("0x4b")]).unwrap();

        assert_eq!(chain.best(), &h("0x4"));
    }

    #[test]
    fn test_finalize_unknown_head_rejected() {
        let mut chain = chain();
        let err = chain.finalize(vec![h("0x9")], vec![]).unwrap_err();
        assert!(matches!(err, ChainHeadError::BlockNotPinned(_)));
        assert_eq!(chain.finalized(), &h("0x3"));
        assert_eq!(chain.pinned_hashes().len(), 3);
    }

    #[test]
    fn test_finalize_skips_unknown_pruned() {
        let mut chain = chain();
        chain.add_block(h("0x4"), h("0x3"), None);
        let fin = chain.finalize(vec![h("0x4")], vec![h("0xdead")]).unwrap();
        assert!(!fin.unpin.contains(&h("0xdead")));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Add { hash: u8, parent: u8 },
        Best(u8),
        Finalize { upto: u8, pruned: Vec<u8> },
    }

    fn hash_of(n: u8) -> BlockHash {
        BlockHash::new(format!("0x{n:02x}"))
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..24, 0u8..24).prop_map(|(hash, parent)| Step::Add { hash, parent }),
            (0u8..24).prop_map(Step::Best),
            (0u8..24, prop::collection::vec(0u8..24, 0..4))
                .prop_map(|(upto, pruned)| Step::Finalize { upto, pruned }),
        ]
    }

    proptest! {
        #[test]
        fn proptest_pointers_stay_pinned(steps in prop::collection::vec(step(), 0..64)) {
            let mut chain = PinnedChain::from_initialized(vec![hash_of(0)], Some(spec(1))).unwrap();

            for step in steps {
                match step {
                    Step::Add { hash, parent } => {
                        chain.add_block(hash_of(hash), hash_of(parent), None);
                    }
                    Step::Best(hash) => {
                        let _ = chain.set_best(hash_of(hash));
                    }
                    Step::Finalize { upto, pruned } => {
                        let pruned = pruned.into_iter().map(hash_of).collect();
                        let _ = chain.finalize(vec![hash_of(upto)], pruned);
                    }
                }

                prop_assert!(chain.is_pinned(chain.best()));
                prop_assert!(chain.is_pinned(chain.finalized()));
                prop_assert!(chain.finalized_runtime().is_some());
            }
        }
    }
}
