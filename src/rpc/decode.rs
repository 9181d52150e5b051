//! Decoding helpers that turn batched RPC results back into chain records.
//!
//! Batch responses carry no correlation beyond their position: result `i` answers
//! query `i`. Every function here relies on that ordering and numbers blocks from
//! the request, never from the payload.

use crate::chain::{Account, Block, DynamicGlobalProperties};
use crate::rpc::error::RpcError;
use crate::rpc::query::{GET_ACCOUNTS, GET_BLOCK, GET_BLOCK_RANGE, GET_DYNAMIC_GLOBAL_PROPERTIES};
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct BlockResult {
    #[serde(default)]
    block: Option<Block>,
}

#[derive(Deserialize)]
struct BlockRangeResult {
    blocks: Vec<Block>,
}

/// Decodes the results of N batched `get_block` queries.
///
/// `block_nums[i]` is the number requested by query `i`. An empty result (the node
/// has not produced that block yet) decodes as `None` at the same position.
pub fn decode_block_batch(results: Vec<Value>, block_nums: &[u64]) -> Result<Vec<Option<Block>>> {
    if results.len() != block_nums.len() {
        return Err(RpcError::decode(
            GET_BLOCK,
            format!(
                "expected {} results, got {}",
                block_nums.len(),
                results.len()
            ),
        )
        .into());
    }

    results
        .into_iter()
        .zip(block_nums.iter().copied())
        .map(|(value, block_num)| {
            let result: BlockResult = serde_json::from_value(value).map_err(|err| {
                RpcError::decode(GET_BLOCK, format!("block {block_num}: {err}"))
            })?;
            Ok::<_, anyhow::Error>(result.block.map(|mut block| {
                block.block_number = block_num;
                block
            }))
        })
        .collect()
}

/// Decodes the results of a `get_block_range` call, flattening the nested block
/// lists in order and numbering them from `starting_block_num`.
pub fn decode_block_range(results: Vec<Value>, starting_block_num: u64) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    for value in results {
        let result: BlockRangeResult =
            serde_json::from_value(value).map_err(|err| RpcError::decode(GET_BLOCK_RANGE, err))?;
        blocks.extend(result.blocks);
    }

    for (offset, block) in blocks.iter_mut().enumerate() {
        block.block_number = starting_block_num.saturating_add(offset as u64);
    }

    Ok(blocks)
}

pub fn decode_global_properties(value: Value) -> Result<DynamicGlobalProperties> {
    serde_json::from_value(value)
        .map_err(|err| RpcError::decode(GET_DYNAMIC_GLOBAL_PROPERTIES, err).into())
}

pub fn decode_accounts(value: Value) -> Result<Vec<Account>> {
    serde_json::from_value(value).map_err(|err| RpcError::decode(GET_ACCOUNTS, err).into())
}
