//! Events pushed over the follow subscription.

use serde::{Deserialize, Serialize};

use crate::{BlockHash, HexString, OperationId, RuntimeEvent, StorageResultItem};

/// Event of the `chainHead_*_follow` subscription.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FollowEvent {
    Initialized(Initialized),
    NewBlock(NewBlock),
    BestBlockChanged(BestBlockChanged),
    Finalized(Finalized),
    #[serde(rename_all = "camelCase")]
    OperationBodyDone {
        operation_id: OperationId,
        value: Vec<HexString>,
    },
    #[serde(rename_all = "camelCase")]
    OperationCallDone {
        operation_id: OperationId,
        output: HexString,
    },
    #[serde(rename_all = "camelCase")]
    OperationStorageItems {
        operation_id: OperationId,
        items: Vec<StorageResultItem>,
    },
    #[serde(rename_all = "camelCase")]
    OperationStorageDone { operation_id: OperationId },
    #[serde(rename_all = "camelCase")]
    OperationWaitingForContinue { operation_id: OperationId },
    #[serde(rename_all = "camelCase")]
    OperationInaccessible { operation_id: OperationId },
    #[serde(rename_all = "camelCase")]
    OperationError {
        operation_id: OperationId,
        error: String,
    },
    /// The node gave up on the subscription. Nothing else follows.
    Stop,
}

impl FollowEvent {
    /// Splits off the operation lifecycle events.
    ///
    /// Chain events (`initialized`, `newBlock`, `bestBlockChanged`,
    /// `finalized`, `stop`) are handed back unchanged in the `Err` variant.
    pub fn into_operation(self) -> Result<(OperationId, OperationEvent), FollowEvent> {
        let split = match self {
            FollowEvent::OperationBodyDone {
                operation_id,
                value,
            } => (operation_id, OperationEvent::BodyDone(value)),
            FollowEvent::OperationCallDone {
                operation_id,
                output,
            } => (operation_id, OperationEvent::CallDone(output)),
            FollowEvent::OperationStorageItems {
                operation_id,
                items,
            } => (operation_id, OperationEvent::StorageItems(items)),
            FollowEvent::OperationStorageDone { operation_id } => {
                (operation_id, OperationEvent::StorageDone)
            }
            FollowEvent::OperationWaitingForContinue { operation_id } => {
                (operation_id, OperationEvent::WaitingForContinue)
            }
            FollowEvent::OperationInaccessible { operation_id } => {
                (operation_id, OperationEvent::Inaccessible)
            }
            FollowEvent::OperationError {
                operation_id,
                error,
            } => (operation_id, OperationEvent::Error(error)),
            other => return Err(other),
        };
        Ok(split)
    }
}

/// Operation lifecycle event, detached from its operation id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationEvent {
    BodyDone(Vec<HexString>),
    CallDone(HexString),
    StorageItems(Vec<StorageResultItem>),
    StorageDone,
    WaitingForContinue,
    Inaccessible,
    Error(String),
}

impl OperationEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            OperationEvent::BodyDone(_) => "operationBodyDone",
            OperationEvent::CallDone(_) => "operationCallDone",
            OperationEvent::StorageItems(_) => "operationStorageItems",
            OperationEvent::StorageDone => "operationStorageDone",
            OperationEvent::WaitingForContinue => "operationWaitingForContinue",
            OperationEvent::Inaccessible => "operationInaccessible",
            OperationEvent::Error(_) => "operationError",
        }
    }
}

/// First event of every subscription.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initialized {
    /// Finalized blocks pinned for us, oldest first.
    #[serde(default)]
    pub finalized_block_hashes: Vec<BlockHash>,
    /// Single-hash form used by the `unstable` method group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_block_hash: Option<BlockHash>,
    #[serde(default)]
    pub finalized_block_runtime: Option<RuntimeEvent>,
}

impl Initialized {
    /// Returns the pinned finalized hashes, oldest first, whichever form the
    /// node used.
    pub fn finalized_hashes(&self) -> Vec<BlockHash> {
        if !self.finalized_block_hashes.is_empty() {
            return self.finalized_block_hashes.clone();
        }
        self.finalized_block_hash.iter().cloned().collect()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub block_hash: BlockHash,
    pub parent_block_hash: BlockHash,
    /// Present only if this block changed the runtime.
    #[serde(default)]
    pub new_runtime: Option<RuntimeEvent>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestBlockChanged {
    pub best_block_hash: BlockHash,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finalized {
    /// Newly finalized blocks, oldest first.
    pub finalized_block_hashes: Vec<BlockHash>,
    /// Blocks of abandoned forks.
    #[serde(default)]
    pub pruned_block_hashes: Vec<BlockHash>,
}
