//! Client-side tracking of a node's chain head over the `chainHead` JSON-RPC
//! method group.
//!
//! [`ChainHeadTracker`] keeps the follow subscription, mirrors the set of
//! blocks the node pinned for it and turns the node's asynchronous operation
//! events back into plain request/response calls.

mod chain;
mod correlator;
mod errors;
mod notification;
mod operation;
mod session;
mod task;
mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use correlator::{CorrelatorError, Delivery, OperationCorrelator, OperationReducer, Registered};
pub use errors::{ChainHeadError, Result};
pub use notification::ChainHeadNotification;
pub use operation::{OperationKind, OperationOutput};
pub use tracker::{
    ChainHeadTracker, ChainHeadTrackerBuilder, DEFAULT_METHOD_GROUP, DEFAULT_NOTIFICATION_CAPACITY,
};
