//! Request builders for the node APIs the streamer talks to. Pure constructors:
//! no validation happens here, the node rejects what it does not accept.

use serde_json::{json, Value};

pub const GET_BLOCK: &str = "block_api.get_block";
pub const GET_BLOCK_RANGE: &str = "block_api.get_block_range";
pub const GET_DYNAMIC_GLOBAL_PROPERTIES: &str = "condenser_api.get_dynamic_global_properties";
pub const GET_ACCOUNTS: &str = "condenser_api.get_accounts";

/// A method name plus its JSON parameters. Queries carry no identity; a batch of
/// queries is matched back to its responses by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub method: &'static str,
    pub params: Value,
}

impl Query {
    pub fn new(method: &'static str, params: Value) -> Self {
        Self { method, params }
    }
}

pub fn get_block(block_num: u64) -> Query {
    Query::new(GET_BLOCK, json!({ "block_num": block_num }))
}

pub fn get_block_range(starting_block_num: u64, count: u32) -> Query {
    Query::new(
        GET_BLOCK_RANGE,
        json!({ "starting_block_num": starting_block_num, "count": count }),
    )
}

pub fn get_dynamic_global_properties() -> Query {
    Query::new(GET_DYNAMIC_GLOBAL_PROPERTIES, json!([]))
}

pub fn get_accounts<S: AsRef<str>>(names: &[S]) -> Query {
    let names: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    Query::new(GET_ACCOUNTS, json!([names]))
}
