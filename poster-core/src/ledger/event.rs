/*
    event.rs - The NewPost log entry

    Layout of one entry:

        topics[0]  keccak256("NewPost(address,string,string)")
        topics[1]  author, left-padded to 32 bytes
        topics[2]  keccak256(tag)
        data       ABI-encoded content string:
                   [offset = 0x20][length][bytes, right-padded to 32]

    Indexed strings only survive as their hash, which is why the tag cannot
    be read back from a record.
*/

use super::errors::{LedgerError, LedgerResult};
use super::types::LogEntry;
use crate::primitives::{keccak256, Address, H256};
use crate::tag::hash_tag;

/// Canonical signature of the post event
pub const NEW_POST_SIGNATURE: &str = "NewPost(address,string,string)";

const WORD: usize = 32;

/// `topics[0]` of every post entry
pub fn new_post_topic() -> H256 {
    keccak256(NEW_POST_SIGNATURE.as_bytes())
}

/// ABI-encode a single dynamic `string`
pub fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(2 * WORD + padded);
    out.extend_from_slice(H256::from_u64(WORD as u64).as_bytes());
    out.extend_from_slice(H256::from_u64(bytes.len() as u64).as_bytes());
    out.extend_from_slice(bytes);
    out.resize(2 * WORD + padded, 0);
    out
}

fn read_word_as_usize(data: &[u8], at: usize) -> LedgerResult<usize> {
    let word = at
        .checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| LedgerError::MalformedLog(format!("word at {} out of bounds", at)))?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(LedgerError::MalformedLog(format!("word at {} overflows", at)));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(be))
        .map_err(|_| LedgerError::MalformedLog(format!("word at {} overflows", at)))
}

/// Decode the payload produced by [`encode_string`]
pub fn decode_string(data: &[u8]) -> LedgerResult<String> {
    let offset = read_word_as_usize(data, 0)?;
    let len = read_word_as_usize(data, offset)?;
    let start = offset + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::MalformedLog("string runs past payload".to_string()))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| LedgerError::MalformedLog(format!("content is not UTF-8: {}", e)))
}

/// Decoded fields of one `NewPost` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub author: Address,
    pub content: String,
    pub tag_hash: H256,
}

impl NewPost {
    /// Build the event for a post call; the tag is hashed here, on the write path
    pub fn new(author: Address, content: &str, tag: &str) -> Self {
        Self { author, content: content.to_string(), tag_hash: hash_tag(tag) }
    }

    pub fn topics(&self) -> Vec<H256> {
        vec![new_post_topic(), self.author.to_topic(), self.tag_hash]
    }

    pub fn data(&self) -> Vec<u8> {
        encode_string(&self.content)
    }

    /// Decode an entry, checking the signature topic and topic count
    pub fn from_log(entry: &LogEntry) -> LedgerResult<Self> {
        if entry.topics.len() != 3 {
            return Err(LedgerError::MalformedLog(format!(
                "expected 3 topics, got {}",
                entry.topics.len()
            )));
        }
        if entry.topics[0] != new_post_topic() {
            return Err(LedgerError::MalformedLog("not a NewPost entry".to_string()));
        }
        let author = Address::from_topic(&entry.topics[1])
            .ok_or_else(|| LedgerError::MalformedLog("author topic is not an address".to_string()))?;
        let content = decode_string(&entry.data)?;
        Ok(Self { author, content, tag_hash: entry.topics[2] })
    }
}
