use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subset of `condenser_api.get_dynamic_global_properties` the streamer relies on.
/// Everything else the node reports is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicGlobalProperties {
    pub head_block_number: u64,
    #[serde(default)]
    pub head_block_id: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub current_witness: String,
    #[serde(default)]
    pub last_irreversible_block_num: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
