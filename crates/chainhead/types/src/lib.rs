//! Wire types of the `chainHead` JSON-RPC method group.
//!
//! These mirror the JSON shapes a node pushes over the follow subscription and
//! returns from the operation-starting methods. Payload bytes (extrinsics, call
//! outputs, storage values) stay hex-encoded strings; interpreting them is the
//! job of a codec layer above this crate.

mod event;
mod ids;
mod macros;
mod method;
mod runtime;
mod storage;

pub use event::{BestBlockChanged, Finalized, FollowEvent, Initialized, NewBlock, OperationEvent};
pub use ids::{BlockHash, HexString, OperationId};
pub use method::{MethodResponse, RpcMethods};
pub use runtime::{RuntimeEvent, RuntimeSpec};
pub use storage::{StorageQuery, StorageQueryType, StorageResultItem};
