//! Blocks, log entries and range selectors shared by the store and its readers.

use crate::primitives::{Address, BlockNumber, H256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A block position, either fixed or resolved against the chain head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    /// Block 0
    Earliest,
    /// The most recently appended block
    Latest,
    /// The newest block at least `finality_depth` blocks below the head
    Finalized,
    /// A fixed height
    Number(BlockNumber),
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Earliest => f.write_str("earliest"),
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Finalized => f.write_str("finalized"),
            BlockTag::Number(n) => write!(f, "{}", n),
        }
    }
}

impl FromStr for BlockTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earliest" => Ok(BlockTag::Earliest),
            "latest" => Ok(BlockTag::Latest),
            "finalized" => Ok(BlockTag::Finalized),
            other => other
                .parse::<BlockNumber>()
                .map(BlockTag::Number)
                .map_err(|_| format!("invalid block tag: {}", s)),
        }
    }
}

/// One structured log entry emitted by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Contract that emitted the entry
    pub address: Address,
    /// Indexed fields; `topics[0]` is the event signature hash
    pub topics: Vec<H256>,
    /// Non-indexed payload
    pub data: Vec<u8>,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub transaction_hash: H256,
    pub transaction_index: u32,
    /// Position of the entry within its block
    pub log_index: u32,
}

/// Selects log entries by emitter, topics and block range.
///
/// `topics[i] == None` matches any value in that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub topics: Vec<Option<H256>>,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
}

impl LogFilter {
    pub fn new(from_block: BlockTag, to_block: BlockTag) -> Self {
        Self { address: None, topics: Vec::new(), from_block, to_block }
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn topic(mut self, position: usize, value: H256) -> Self {
        if self.topics.len() <= position {
            self.topics.resize(position + 1, None);
        }
        self.topics[position] = Some(value);
        self
    }

    /// Whether `entry` satisfies the address and topic constraints
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(address) = &self.address {
            if entry.address != *address {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, wanted)| match wanted {
            None => true,
            Some(topic) => entry.topics.get(i) == Some(topic),
        })
    }
}

/// Transaction summary kept in a block, enough to replay account state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTransaction {
    pub hash: H256,
    pub from: Address,
    pub nonce: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: BlockNumber,
    pub hash: H256,
    pub parent_hash: H256,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub transactions: Vec<BlockTransaction>,
    pub logs: Vec<LogEntry>,
}

/// Write acknowledgment returned for an accepted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: BlockNumber,
    pub block_hash: H256,
    pub from: Address,
    pub gas_used: u64,
    pub fee: u64,
    pub logs: Vec<LogEntry>,
}
