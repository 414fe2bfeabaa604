use std::{fmt, mem, ops::ControlFlow};

use strata_chainhead_types::{HexString, OperationEvent, OperationId, StorageResultItem};

use crate::{
    correlator::{OperationCorrelator, OperationReducer},
    errors::ChainHeadError,
};

/// How an operation ended.
pub(crate) type OperationOutcome = Result<OperationOutput, OperationFailure>;

/// Operation table of a follow session.
pub(crate) type Operations = OperationCorrelator<OperationId, OperationEvent, OperationAccumulator>;

/// Kind of operation started against a pinned block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Body,
    Call,
    Storage,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Body => "body",
            OperationKind::Call => "call",
            OperationKind::Storage => "storage",
        };
        f.write_str(name)
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// Encoded extrinsics of the block.
    Body(Vec<HexString>),
    /// Encoded output of a runtime call.
    Call(HexString),
    /// Every storage item reported before the operation finished.
    Storage(Vec<StorageResultItem>),
}

impl OperationOutput {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationOutput::Body(_) => OperationKind::Body,
            OperationOutput::Call(_) => OperationKind::Call,
            OperationOutput::Storage(_) => OperationKind::Storage,
        }
    }

    fn mismatch(&self, expected: OperationKind) -> ChainHeadError {
        ChainHeadError::UnexpectedOutput {
            expected,
            actual: self.kind(),
        }
    }

    pub fn into_body(self) -> Result<Vec<HexString>, ChainHeadError> {
        match self {
            OperationOutput::Body(extrinsics) => Ok(extrinsics),
            other => Err(other.mismatch(OperationKind::Body)),
        }
    }

    pub fn into_call(self) -> Result<HexString, ChainHeadError> {
        match self {
            OperationOutput::Call(output) => Ok(output),
            other => Err(other.mismatch(OperationKind::Call)),
        }
    }

    pub fn into_storage(self) -> Result<Vec<StorageResultItem>, ChainHeadError> {
        match self {
            OperationOutput::Storage(items) => Ok(items),
            other => Err(other.mismatch(OperationKind::Storage)),
        }
    }
}

/// Why an operation ended without output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OperationFailure {
    Failed(String),
    /// The node could not serve the operation right now; resubmit it.
    Inaccessible,
    SessionEnded,
    SubscriptionStopped,
}

impl From<OperationFailure> for ChainHeadError {
    fn from(failure: OperationFailure) -> Self {
        match failure {
            OperationFailure::Failed(reason) => ChainHeadError::OperationFailed(reason),
            OperationFailure::Inaccessible => {
                ChainHeadError::OperationFailed("operation inaccessible".to_string())
            }
            OperationFailure::SessionEnded => ChainHeadError::SessionEnded,
            OperationFailure::SubscriptionStopped => ChainHeadError::SubscriptionStopped,
        }
    }
}

/// Reduces the events of any operation kind into an [`OperationOutput`].
///
/// Storage items are collected until `operationStorageDone`.
#[derive(Debug, Default)]
pub(crate) struct OperationAccumulator {
    storage_items: Vec<StorageResultItem>,
}

impl OperationReducer<OperationEvent> for OperationAccumulator {
    type Output = OperationOutput;
    type Error = OperationFailure;

    fn reduce(
        &mut self,
        event: OperationEvent,
    ) -> ControlFlow<Result<OperationOutput, OperationFailure>> {
        let result = match event {
            OperationEvent::BodyDone(extrinsics) => Ok(OperationOutput::Body(extrinsics)),
            OperationEvent::CallDone(output) => Ok(OperationOutput::Call(output)),
            OperationEvent::StorageItems(items) => {
                self.storage_items.extend(items);
                return ControlFlow::Continue(());
            }
            OperationEvent::StorageDone => {
                Ok(OperationOutput::Storage(mem::take(&mut self.storage_items)))
            }
            OperationEvent::WaitingForContinue => return ControlFlow::Continue(()),
            OperationEvent::Inaccessible => Err(OperationFailure::Inaccessible),
            OperationEvent::Error(reason) => Err(OperationFailure::Failed(reason)),
        };
        ControlFlow::Break(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, value: &str) -> StorageResultItem {
        StorageResultItem {
            key: HexString::new(key),
            value: Some(HexString::new(value)),
            hash: None,
            closest_descendant_merkle_value: None,
            child_trie_key: None,
        }
    }

    #[test]
    fn test_body_done_finishes() {
        let mut acc = OperationAccumulator::default();
        let flow = acc.reduce(OperationEvent::BodyDone(vec![HexString::new("0xaa")]));
        assert_eq!(
            flow,
            ControlFlow::Break(Ok(OperationOutput::Body(vec![HexString::new("0xaa")])))
        );
    }

    #[test]
    fn test_storage_items_accumulate_until_done() {
        let mut acc = OperationAccumulator::default();
        assert_eq!(
            acc.reduce(OperationEvent::StorageItems(vec![item("0x01", "0x0a")])),
            ControlFlow::Continue(())
        );
        assert_eq!(
            acc.reduce(OperationEvent::WaitingForContinue),
            ControlFlow::Continue(())
        );
        assert_eq!(
            acc.reduce(OperationEvent::StorageItems(vec![item("0x02", "0x0b")])),
            ControlFlow::Continue(())
        );

        let flow = acc.reduce(OperationEvent::StorageDone);
        assert_eq!(
            flow,
            ControlFlow::Break(Ok(OperationOutput::Storage(vec![
                item("0x01", "0x0a"),
                item("0x02", "0x0b"),
            ])))
        );
    }

    #[test]
    fn test_error_and_inaccessible_are_terminal() {
        let mut acc = OperationAccumulator::default();
        assert_eq!(
            acc.reduce(OperationEvent::Error("boom".into())),
            ControlFlow::Break(Err(OperationFailure::Failed("boom".into())))
        );
        assert_eq!(
            acc.reduce(OperationEvent::Inaccessible),
            ControlFlow::Break(Err(OperationFailure::Inaccessible))
        );
    }

    #[test]
    fn test_output_kind_mismatch() {
        let output = OperationOutput::Call(HexString::new("0x01"));
        let err = output.into_body().unwrap_err();
        assert!(matches!(
            err,
            ChainHeadError::UnexpectedOutput {
                expected: OperationKind::Body,
                actual: OperationKind::Call,
            }
        ));
    }
}
