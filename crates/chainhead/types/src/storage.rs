use serde::{Deserialize, Serialize};

use crate::HexString;

/// Kind of lookup requested for a storage key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageQueryType {
    Value,
    Hash,
    ClosestDescendantMerkleValue,
    DescendantsValues,
    DescendantsHashes,
}

/// One item of a `chainHead_*_storage` request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StorageQuery {
    pub key: HexString,
    #[serde(rename = "type")]
    pub query_type: StorageQueryType,
}

impl StorageQuery {
    pub fn new(key: impl Into<HexString>, query_type: StorageQueryType) -> Self {
        Self {
            key: key.into(),
            query_type,
        }
    }
}

/// One item reported by an `operationStorageItems` event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageResultItem {
    pub key: HexString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<HexString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HexString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest_descendant_merkle_value: Option<HexString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_trie_key: Option<HexString>,
}
