use crate::chain::operation::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of hex characters at the start of a block id that encode the block number.
const BLOCK_NUM_HEX_CHARS: usize = 8;

/// A signed block as returned by `block_api`.
///
/// `block_number` is not part of the wire payload. The decoder assigns it from the
/// position of the block in the response, relative to the number that was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    #[serde(skip)]
    pub block_number: u64,
    pub block_id: String,
    pub previous: String,
    pub timestamp: String,
    pub witness: String,
    pub transaction_merkle_root: String,
    pub transactions: Vec<Transaction>,
    pub extensions: Vec<Value>,
    pub signing_key: String,
    pub transaction_ids: Vec<String>,
    pub witness_signature: String,
}

impl Block {
    /// Iterates transactions alongside their ids. Blocks always carry both lists in the
    /// same order; if a node ever returns fewer ids, the unmatched transactions are skipped.
    pub fn transactions_with_ids(&self) -> impl Iterator<Item = (&str, &Transaction)> {
        self.transaction_ids
            .iter()
            .map(String::as_str)
            .zip(self.transactions.iter())
    }

    pub fn operation_count(&self) -> usize {
        self.transactions.iter().map(|tx| tx.operations.len()).sum()
    }
}

/// A transaction embedded in exactly one [`Block`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transaction {
    pub expiration: String,
    pub extensions: Vec<Value>,
    pub operations: Vec<Operation>,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub signatures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_auths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_posting_auths: Option<Vec<String>>,
}

/// Extracts the block number encoded in the first four bytes of a block id.
///
/// Returns `None` when the id is too short or not hexadecimal.
pub fn block_num_from_id(block_id: &str) -> Option<u64> {
    let prefix = block_id.get(..BLOCK_NUM_HEX_CHARS)?;
    u64::from_str_radix(prefix, 16).ok()
}
