//! Single round-trip block retrieval.
//!
//! `BlockFetcher` pairs the query builders with the decoders: every method issues
//! exactly one logical round trip through the transport and returns decoded chain
//! records. It never retries; the stream producers own that policy.

use crate::chain::{Account, Block};
use crate::rpc::client::RpcTransport;
use crate::rpc::decode::{
    decode_accounts, decode_block_batch, decode_block_range, decode_global_properties,
};
use crate::rpc::query;
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct BlockFetcher {
    transport: Arc<dyn RpcTransport>,
}

impl BlockFetcher {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Fetches up to `count` consecutive blocks starting at `start`.
    ///
    /// The node may return fewer blocks than asked for (or none, near the head); the
    /// returned blocks are numbered `start, start + 1, ...` in response order.
    pub async fn fetch_range(&self, start: u64, count: u32) -> Result<Vec<Block>> {
        let queries = [query::get_block_range(start, count)];
        let results = self.transport.execute_batch(&queries).await?;
        decode_block_range(results, start)
    }

    /// Fetches one block. `Ok(None)` means the node answered but has not produced it yet.
    pub async fn fetch_block(&self, block_num: u64) -> Result<Option<Block>> {
        let mut blocks = self.fetch_blocks(&[block_num]).await?;
        Ok(blocks.pop().flatten())
    }

    /// Fetches arbitrary blocks in one batched round trip. Results follow `block_nums` order.
    pub async fn fetch_blocks(&self, block_nums: &[u64]) -> Result<Vec<Option<Block>>> {
        if block_nums.is_empty() {
            return Ok(Vec::new());
        }
        let queries: Vec<_> = block_nums.iter().copied().map(query::get_block).collect();
        let results = self.transport.execute_batch(&queries).await?;
        decode_block_batch(results, block_nums)
    }

    /// Current head block number from the node's dynamic global properties.
    pub async fn head_block_number(&self) -> Result<u64> {
        let value = self
            .transport
            .execute(&query::get_dynamic_global_properties())
            .await
            .context("failed to fetch dynamic global properties")?;
        let properties = decode_global_properties(value)?;
        Ok(properties.head_block_number)
    }

    pub async fn get_accounts<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Account>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let value = self
            .transport
            .execute(&query::get_accounts(names))
            .await
            .context("failed to fetch accounts")?;
        decode_accounts(value)
    }
}
