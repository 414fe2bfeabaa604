use serde::{Deserialize, Serialize};

use crate::macros::impl_string_wrapper;

/// Hex-encoded block hash as reported by the node.
///
/// Kept opaque: the length of a hash depends on the chain, and nothing in the
/// follow protocol needs to look inside it.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl_string_wrapper!(BlockHash);

/// Server-minted identifier of a long-running `body`/`call`/`storage` operation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl_string_wrapper!(OperationId);

/// Opaque hex payload (`0x`-prefixed) such as an extrinsic or a call output.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexString(String);

impl_string_wrapper!(HexString);
