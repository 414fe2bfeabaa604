use serde::{Deserialize, Serialize};

use crate::OperationId;

/// Immediate acknowledgment of `body`, `call` and `storage` requests.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum MethodResponse {
    /// The node started the operation; its outcome arrives as follow events.
    #[serde(rename_all = "camelCase")]
    Started {
        operation_id: OperationId,
        /// Number of storage items the node refused to handle.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discarded_items: Option<u64>,
    },
    /// The node has too many operations in flight for this subscription.
    LimitReached,
}

/// Response of the `rpc_methods` discovery call.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RpcMethods {
    pub methods: Vec<String>,
}
