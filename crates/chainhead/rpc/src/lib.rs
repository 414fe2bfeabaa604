//! Transport plumbing for the `chainHead` method group.
//!
//! [`RpcTransport`] is the seam to whatever carries JSON-RPC frames to the
//! node, [`VersionedMethodGroup`] negotiates which versioned method names the
//! node exposes, and [`WsTransport`] is the jsonrpsee WebSocket implementation
//! used by the follower service.

mod errors;
mod method_group;
mod transport;
mod ws;

pub use errors::{MethodGroupError, TransportError};
pub use method_group::{VersionedMethodGroup, RPC_METHODS};
#[cfg(any(test, feature = "test-utils"))]
pub use transport::MockRpcTransport;
pub use transport::{RawSubscription, RpcTransport, SubscriptionCancel, SubscriptionFeed};
pub use ws::WsTransport;
