//! Feed assembly: raw `NewPost` entries into newest-first post views.

use crate::ledger::{LogEntry, NewPost};
use crate::primitives::{Address, BlockNumber, H256};
use crate::tag::TagIndex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A post as shown to a reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub author: Address,
    pub content: String,
    pub tag_hash: H256,
    pub transaction_hash: H256,
    pub block_number: BlockNumber,
    pub log_index: u32,
}

impl PostView {
    /// Decode one entry, keeping its provenance
    pub fn from_log(entry: &LogEntry) -> Option<Self> {
        match NewPost::from_log(entry) {
            Ok(post) => Some(PostView {
                author: post.author,
                content: post.content,
                tag_hash: post.tag_hash,
                transaction_hash: entry.transaction_hash,
                block_number: entry.block_number,
                log_index: entry.log_index,
            }),
            Err(e) => {
                warn!(
                    tx = %entry.transaction_hash,
                    block = entry.block_number,
                    error = %e,
                    "Skipping malformed post entry"
                );
                None
            }
        }
    }
}

/// Map entries given in append order into views, newest first.
///
/// Entries that do not decode as `NewPost` are skipped.
pub fn assemble(entries: &[LogEntry]) -> Vec<PostView> {
    entries.iter().rev().filter_map(PostView::from_log).collect()
}

/// Keep posts tagged `tag` as resolved through `index`.
///
/// An absent or empty filter returns every post.
pub fn filter(posts: &[PostView], tag: Option<&str>, index: &TagIndex) -> Vec<PostView> {
    match tag {
        Some(tag) if !tag.is_empty() => filter_by_hash(posts, &index.hash(tag)),
        _ => posts.to_vec(),
    }
}

pub fn filter_by_hash(posts: &[PostView], tag_hash: &H256) -> Vec<PostView> {
    posts.iter().filter(|post| post.tag_hash == *tag_hash).cloned().collect()
}
