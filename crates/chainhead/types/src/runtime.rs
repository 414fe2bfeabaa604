use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Runtime version record attached to the block that introduced it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub spec_name: String,
    pub impl_name: String,
    pub spec_version: u32,
    pub impl_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_version: Option<u32>,
    /// Runtime API name to API version.
    #[serde(default)]
    pub apis: BTreeMap<String, u32>,
}

/// Runtime as reported alongside `initialized` and `newBlock` events.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuntimeEvent {
    Valid { spec: RuntimeSpec },
    Invalid { error: String },
}

impl RuntimeEvent {
    /// Returns the runtime spec if the node could compile the runtime.
    pub fn into_spec(self) -> Option<RuntimeSpec> {
        match self {
            RuntimeEvent::Valid { spec } => Some(spec),
            RuntimeEvent::Invalid { .. } => None,
        }
    }
}
