/*
    query - Log query layer

    Replays `NewPost` entries from a ledger over an inclusive block range,
    ascending in append order. Every call rescans the whole requested range:
    there is no cache and no delta mode.

    Readers sit behind the `LedgerReader` trait so the same query runs
    against the in-process chain or any other log source.
*/

use crate::ledger::{new_post_topic, BlockTag, DevLedger, LedgerError, LogEntry, LogFilter};
use crate::metrics::Timer;
use crate::primitives::{Address, BlockNumber, ChainId, H256};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while reading log history
#[derive(Debug, Error)]
pub enum QueryError {
    /// The log source could not be reached
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// The log source failed while serving the request
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Read side of a ledger
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Network the reader is attached to
    async fn chain_id(&self) -> QueryResult<ChainId>;

    /// Current head height
    async fn block_number(&self) -> QueryResult<BlockNumber>;

    /// Entries matching `filter`, ascending by (block, log index)
    async fn get_logs(&self, filter: &LogFilter) -> QueryResult<Vec<LogEntry>>;
}

#[async_trait]
impl LedgerReader for DevLedger {
    async fn chain_id(&self) -> QueryResult<ChainId> {
        Ok(DevLedger::chain_id(self))
    }

    async fn block_number(&self) -> QueryResult<BlockNumber> {
        Ok(self.head().await)
    }

    async fn get_logs(&self, filter: &LogFilter) -> QueryResult<Vec<LogEntry>> {
        Ok(self.logs(filter).await)
    }
}

/// Shared reader handle
pub type SharedReader = Arc<dyn LedgerReader>;

/// Range queries for the record store's `NewPost` entries
#[derive(Clone)]
pub struct PostQuery {
    reader: SharedReader,
    contract: Address,
}

impl PostQuery {
    pub fn new(reader: SharedReader, contract: Address) -> Self {
        Self { reader, contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Every `NewPost` entry in `[from, to]`, oldest first
    pub async fn query_posts(&self, from: BlockTag, to: BlockTag) -> QueryResult<Vec<LogEntry>> {
        let filter = LogFilter::new(from, to).address(self.contract).topic(0, new_post_topic());
        self.run(filter).await
    }

    /// Entries in `[from, to]` whose indexed tag topic equals `tag_hash`.
    ///
    /// The match happens on the indexed topic, so payloads are never scanned.
    pub async fn query_posts_by_tag(
        &self,
        tag_hash: H256,
        from: BlockTag,
        to: BlockTag,
    ) -> QueryResult<Vec<LogEntry>> {
        let filter = LogFilter::new(from, to)
            .address(self.contract)
            .topic(0, new_post_topic())
            .topic(2, tag_hash);
        self.run(filter).await
    }

    async fn run(&self, filter: LogFilter) -> QueryResult<Vec<LogEntry>> {
        let timer = Timer::new("query.duration_ms");
        let result = self.reader.get_logs(&filter).await;
        timer.stop();

        match result {
            Ok(mut entries) => {
                entries.sort_by_key(|e| (e.block_number, e.log_index));
                crate::metrics::record_counter("query.logs.scanned", entries.len() as u64);
                debug!(
                    from = %filter.from_block,
                    to = %filter.to_block,
                    entries = entries.len(),
                    "Replayed post entries"
                );
                Ok(entries)
            }
            Err(e) => {
                error!(error = %e, "Failed to replay post entries");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerParams, NewPost, PostCall, UnsignedTransaction};
    use crate::tag::hash_tag;
    use ed25519_dalek::SigningKey;

    const CONTRACT: Address = Address([0xcc; 20]);

    async fn ledger_with_posts(posts: &[(&str, &str)]) -> (Arc<DevLedger>, Address) {
        let ledger = Arc::new(DevLedger::new(LedgerParams {
            chain_id: 1337,
            contract: CONTRACT,
            gas_price: 1,
            finality_depth: 0,
        }));
        let key = SigningKey::from_bytes(&[4u8; 32]);
        let author = Address::from_verifying_key(&key.verifying_key());
        ledger.fund(author, u64::MAX / 2).await.unwrap();
        for (nonce, (content, tag)) in posts.iter().enumerate() {
            let tx = UnsignedTransaction {
                chain_id: 1337,
                nonce: nonce as u64,
                to: CONTRACT,
                gas_price: 1,
                call: PostCall::new(*content, *tag),
            };
            ledger.submit(tx.sign(&key).unwrap()).await.unwrap();
        }
        (ledger, author)
    }

    struct BrokenReader;

    #[async_trait]
    impl LedgerReader for BrokenReader {
        async fn chain_id(&self) -> QueryResult<ChainId> {
            Err(QueryError::Unavailable("offline".to_string()))
        }

        async fn block_number(&self) -> QueryResult<BlockNumber> {
            Err(QueryError::Unavailable("offline".to_string()))
        }

        async fn get_logs(&self, _filter: &LogFilter) -> QueryResult<Vec<LogEntry>> {
            Err(QueryError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_query_before_any_post_is_empty() {
        let (ledger, _) = ledger_with_posts(&[]).await;
        let query = PostQuery::new(ledger, CONTRACT);
        let entries = query.query_posts(BlockTag::Earliest, BlockTag::Latest).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_hello_world_example() {
        let (ledger, author) = ledger_with_posts(&[("Hello, world!", "hello")]).await;
        let query = PostQuery::new(ledger, CONTRACT);
        let entries = query.query_posts(BlockTag::Earliest, BlockTag::Latest).await.unwrap();
        assert_eq!(entries.len(), 1);
        let post = NewPost::from_log(&entries[0]).unwrap();
        assert_eq!(post.content, "Hello, world!");
        assert_eq!(post.tag_hash, hash_tag("hello"));
        assert_eq!(post.author, author);
    }

    #[tokio::test]
    async fn test_entries_come_back_in_append_order() {
        let (ledger, _) = ledger_with_posts(&[("one", "a"), ("two", "b"), ("three", "a")]).await;
        let query = PostQuery::new(ledger, CONTRACT);
        let entries = query.query_posts(BlockTag::Earliest, BlockTag::Latest).await.unwrap();
        let contents: Vec<_> = entries
            .iter()
            .map(|e| NewPost::from_log(e).unwrap().content)
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_same_range_twice_is_identical() {
        let (ledger, _) = ledger_with_posts(&[("one", "a"), ("two", "b")]).await;
        let query = PostQuery::new(ledger, CONTRACT);
        let first = query.query_posts(BlockTag::Earliest, BlockTag::Number(2)).await.unwrap();
        let second = query.query_posts(BlockTag::Earliest, BlockTag::Number(2)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_other_contracts_are_ignored() {
        let (ledger, _) = ledger_with_posts(&[("one", "a")]).await;
        let query = PostQuery::new(ledger, Address([0xee; 20]));
        assert!(query.query_posts(BlockTag::Earliest, BlockTag::Latest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_by_indexed_tag() {
        let (ledger, _) = ledger_with_posts(&[("one", "a"), ("two", "b"), ("three", "a")]).await;
        let query = PostQuery::new(ledger, CONTRACT);
        let entries = query
            .query_posts_by_tag(hash_tag("a"), BlockTag::Earliest, BlockTag::Latest)
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.topics[2] == hash_tag("a")));
    }

    #[tokio::test]
    async fn test_reader_failure_is_returned() {
        let query = PostQuery::new(Arc::new(BrokenReader), CONTRACT);
        let err = query.query_posts(BlockTag::Earliest, BlockTag::Latest).await.unwrap_err();
        assert!(matches!(err, QueryError::Unavailable(_)));
    }
}
