use strata_chainhead_rpc::{MethodGroupError, TransportError};
use strata_chainhead_types::{BlockHash, OperationId};
use thiserror::Error;

use crate::{correlator::CorrelatorError, operation::OperationKind};

pub type Result<T> = std::result::Result<T, ChainHeadError>;

#[derive(Debug, Clone, Error)]
pub enum ChainHeadError {
    #[error("not following the chain")]
    NotFollowing,

    #[error("already following the chain")]
    AlreadyFollowing,

    #[error("block {0} is not pinned")]
    BlockNotPinned(BlockHash),

    #[error("node refused the operation: limit reached")]
    OperationLimitReached,

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation {0} is already in flight")]
    DuplicateOperation(OperationId),

    #[error("expected {expected} output, got {actual}")]
    UnexpectedOutput {
        expected: OperationKind,
        actual: OperationKind,
    },

    #[error("follow subscription stopped")]
    SubscriptionStopped,

    #[error("follow session ended")]
    SessionEnded,

    #[error("invalid follow event: {0}")]
    InvalidEvent(String),

    #[error("method group: {0}")]
    MethodGroup(#[from] MethodGroupError),
}

impl From<TransportError> for ChainHeadError {
    fn from(err: TransportError) -> Self {
        Self::MethodGroup(err.into())
    }
}

impl From<CorrelatorError<OperationId>> for ChainHeadError {
    fn from(err: CorrelatorError<OperationId>) -> Self {
        match err {
            CorrelatorError::DuplicateOperation(id) => Self::DuplicateOperation(id),
        }
    }
}
