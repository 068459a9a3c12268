/*
    chain.rs - In-process development ledger

    Behaves like a local development node with auto-mining: every accepted
    transaction is sealed into its own block immediately. Hosts exactly one
    record store contract whose only entry point is `post(content, tag)`.

    Validation order for a submitted transaction:
      1. chain id matches (replay protection)
      2. gas price >= minimum
      3. signature verifies, which yields the sender
      4. target is the record store
      5. nonce == sender's next nonce
      6. balance covers gas * gas_price

    Any failure returns before the journal or the in-memory chain is touched.
*/

use super::errors::{LedgerError, LedgerResult};
use super::event::NewPost;
use super::journal::{Journal, JournalRecord};
use super::transaction::SignedTransaction;
use super::types::{Block, BlockTag, BlockTransaction, LogEntry, LogFilter, Receipt};
use crate::primitives::{keccak256, Address, BlockNumber, ChainId, H256};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Static parameters of a development chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerParams {
    pub chain_id: ChainId,
    /// Address of the record store contract
    pub contract: Address,
    /// Minimum accepted gas price
    pub gas_price: u64,
    /// Blocks below the head before a block counts as finalized
    pub finality_depth: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Account {
    balance: u64,
    nonce: u64,
}

struct ChainState {
    blocks: Vec<Block>,
    accounts: HashMap<Address, Account>,
    journal: Option<Journal>,
}

#[derive(Serialize)]
struct BlockHeader<'a> {
    number: BlockNumber,
    parent_hash: &'a H256,
    timestamp: u64,
    transactions: &'a [BlockTransaction],
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn genesis(chain_id: ChainId) -> Block {
    Block {
        number: 0,
        hash: keccak256(&chain_id.to_be_bytes()),
        parent_hash: H256::ZERO,
        timestamp: 0,
        transactions: Vec::new(),
        logs: Vec::new(),
    }
}

impl ChainState {
    fn head(&self) -> &Block {
        // Genesis is inserted at construction and blocks are never removed.
        &self.blocks[self.blocks.len() - 1]
    }

    fn apply(&mut self, record: &JournalRecord) -> LedgerResult<()> {
        match record {
            JournalRecord::Funded { address, amount } => {
                let account = self.accounts.entry(*address).or_default();
                account.balance = account.balance.saturating_add(*amount);
            }
            JournalRecord::Block(block) => {
                if block.number != self.head().number + 1 || block.parent_hash != self.head().hash {
                    return Err(LedgerError::CorruptedJournal(format!(
                        "block {} does not extend head {}",
                        block.number,
                        self.head().number
                    )));
                }
                for tx in &block.transactions {
                    let account = self.accounts.entry(tx.from).or_default();
                    account.balance = account.balance.saturating_sub(tx.fee);
                    account.nonce = tx.nonce + 1;
                }
                self.blocks.push(block.clone());
            }
        }
        Ok(())
    }

    /// Persist first, then apply, so a failed write leaves memory untouched
    fn commit(&mut self, record: JournalRecord) -> LedgerResult<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&record)?;
        }
        self.apply(&record)
    }
}

/// Append-only ledger hosting the record store
pub struct DevLedger {
    params: LedgerParams,
    state: RwLock<ChainState>,
}

impl DevLedger {
    /// Create an in-memory chain holding only the genesis block
    pub fn new(params: LedgerParams) -> Self {
        let state = ChainState {
            blocks: vec![genesis(params.chain_id)],
            accounts: HashMap::new(),
            journal: None,
        };
        Self { params, state: RwLock::new(state) }
    }

    /// Open a journaled chain, replaying any history already on disk
    pub fn open(params: LedgerParams, path: impl AsRef<Path>) -> LedgerResult<Self> {
        let (journal, records) = Journal::open(path)?;
        let mut state = ChainState {
            blocks: vec![genesis(params.chain_id)],
            accounts: HashMap::new(),
            journal: None,
        };
        for record in &records {
            state.apply(record)?;
        }
        info!(
            path = %journal.path().display(),
            records = records.len(),
            head = state.head().number,
            "Replayed ledger journal"
        );
        state.journal = Some(journal);
        Ok(Self { params, state: RwLock::new(state) })
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub fn chain_id(&self) -> ChainId {
        self.params.chain_id
    }

    pub fn contract(&self) -> Address {
        self.params.contract
    }

    pub fn gas_price(&self) -> u64 {
        self.params.gas_price
    }

    /// Height of the most recent block
    pub async fn head(&self) -> BlockNumber {
        self.state.read().await.head().number
    }

    pub async fn balance(&self, account: &Address) -> u64 {
        self.state.read().await.accounts.get(account).map(|a| a.balance).unwrap_or(0)
    }

    /// Nonce the next transaction from `account` must carry
    pub async fn nonce(&self, account: &Address) -> u64 {
        self.state.read().await.accounts.get(account).map(|a| a.nonce).unwrap_or(0)
    }

    /// Credit `amount` to `account` outside of any transaction
    pub async fn fund(&self, account: Address, amount: u64) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        state.commit(JournalRecord::Funded { address: account, amount })?;
        debug!(%account, amount, "Funded account");
        Ok(())
    }

    pub async fn block(&self, number: BlockNumber) -> Option<Block> {
        self.state.read().await.blocks.get(number as usize).cloned()
    }

    /// Resolve a tag against the current head
    pub async fn resolve(&self, tag: BlockTag) -> BlockNumber {
        let head = self.head().await;
        self.resolve_with_head(tag, head)
    }

    fn resolve_with_head(&self, tag: BlockTag, head: BlockNumber) -> BlockNumber {
        match tag {
            BlockTag::Earliest => 0,
            BlockTag::Latest => head,
            BlockTag::Finalized => head.saturating_sub(self.params.finality_depth),
            BlockTag::Number(n) => n,
        }
    }

    /// Validate, execute and seal a transaction into a new block
    pub async fn submit(&self, signed: SignedTransaction) -> LedgerResult<Receipt> {
        let result = self.submit_inner(signed).await;
        match &result {
            Ok(receipt) => {
                crate::metrics::record_counter("ledger.posts.appended", 1);
                info!(
                    tx = %receipt.transaction_hash,
                    block = receipt.block_number,
                    author = %receipt.from,
                    "Appended post"
                );
            }
            Err(e) => {
                crate::metrics::record_counter("ledger.tx.rejected", 1);
                warn!(error = %e, "Rejected transaction");
            }
        }
        result
    }

    async fn submit_inner(&self, signed: SignedTransaction) -> LedgerResult<Receipt> {
        let tx = &signed.tx;
        if tx.chain_id != self.params.chain_id {
            return Err(LedgerError::WrongChain { expected: self.params.chain_id, actual: tx.chain_id });
        }
        if tx.gas_price < self.params.gas_price {
            return Err(LedgerError::Underpriced { minimum: self.params.gas_price, offered: tx.gas_price });
        }
        let sender = signed.recover_sender()?;
        if tx.to != self.params.contract {
            return Err(LedgerError::UnknownContract(tx.to));
        }

        let mut state = self.state.write().await;
        let account = state.accounts.get(&sender).copied().unwrap_or_default();
        if tx.nonce != account.nonce {
            return Err(LedgerError::NonceMismatch {
                account: sender,
                expected: account.nonce,
                actual: tx.nonce,
            });
        }
        let gas_used = tx.call.gas();
        let fee = gas_used.saturating_mul(tx.gas_price);
        if account.balance < fee {
            return Err(LedgerError::InsufficientFunds {
                account: sender,
                required: fee,
                available: account.balance,
            });
        }

        let transaction_hash = signed.hash()?;
        let parent = state.head();
        let number = parent.number + 1;
        let parent_hash = parent.hash;
        let transactions = vec![BlockTransaction { hash: transaction_hash, from: sender, nonce: tx.nonce, fee }];
        let timestamp = now_millis();
        let block_hash = keccak256(&bincode::serialize(&BlockHeader {
            number,
            parent_hash: &parent_hash,
            timestamp,
            transactions: &transactions,
        })?);

        let event = NewPost::new(sender, &tx.call.content, &tx.call.tag);
        let log = LogEntry {
            address: self.params.contract,
            topics: event.topics(),
            data: event.data(),
            block_number: number,
            block_hash,
            transaction_hash,
            transaction_index: 0,
            log_index: 0,
        };
        let block = Block {
            number,
            hash: block_hash,
            parent_hash,
            timestamp,
            transactions,
            logs: vec![log.clone()],
        };

        state.commit(JournalRecord::Block(block))?;

        Ok(Receipt {
            transaction_hash,
            block_number: number,
            block_hash,
            from: sender,
            gas_used,
            fee,
            logs: vec![log],
        })
    }

    /// All entries matching `filter`, in ascending (block, log index) order.
    ///
    /// Bounds are inclusive. A range starting above its end (after
    /// resolution) is empty, as is any range past the head.
    pub async fn logs(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let state = self.state.read().await;
        let head = state.head().number;
        let from = self.resolve_with_head(filter.from_block, head);
        let to = self.resolve_with_head(filter.to_block, head).min(head);
        if from > to {
            return Vec::new();
        }

        state.blocks[from as usize..=to as usize]
            .iter()
            .flat_map(|block| block.logs.iter())
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::event::new_post_topic;
    use crate::ledger::transaction::{PostCall, UnsignedTransaction};
    use crate::tag::hash_tag;
    use ed25519_dalek::SigningKey;
    use tempfile::tempdir;

    const CHAIN: ChainId = 1337;

    fn params() -> LedgerParams {
        LedgerParams { chain_id: CHAIN, contract: Address([0xcc; 20]), gas_price: 1, finality_depth: 2 }
    }

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn address(key: &SigningKey) -> Address {
        Address::from_verifying_key(&key.verifying_key())
    }

    fn post_tx(key: &SigningKey, nonce: u64, content: &str, tag: &str) -> SignedTransaction {
        UnsignedTransaction {
            chain_id: CHAIN,
            nonce,
            to: Address([0xcc; 20]),
            gas_price: 1,
            call: PostCall::new(content, tag),
        }
        .sign(key)
        .unwrap()
    }

    async fn funded(key: &SigningKey) -> DevLedger {
        let ledger = DevLedger::new(params());
        ledger.fund(address(key), 1_000_000).await.unwrap();
        ledger
    }

    fn all() -> LogFilter {
        LogFilter::new(BlockTag::Earliest, BlockTag::Latest)
    }

    #[tokio::test]
    async fn test_empty_chain_has_no_logs() {
        let ledger = DevLedger::new(params());
        assert_eq!(ledger.head().await, 0);
        assert!(ledger.logs(&all()).await.is_empty());
    }

    #[tokio::test]
    async fn test_post_appends_one_entry() {
        let alice = key(1);
        let ledger = funded(&alice).await;

        let receipt = ledger.submit(post_tx(&alice, 0, "Hello, world!", "hello")).await.unwrap();
        assert_eq!(receipt.block_number, 1);
        assert_eq!(receipt.from, address(&alice));
        assert_eq!(receipt.logs.len(), 1);

        let logs = ledger.logs(&all()).await;
        assert_eq!(logs.len(), 1);
        let post = NewPost::from_log(&logs[0]).unwrap();
        assert_eq!(post.author, address(&alice));
        assert_eq!(post.content, "Hello, world!");
        assert_eq!(post.tag_hash, hash_tag("hello"));
        assert_eq!(logs[0].topics[0], new_post_topic());
    }

    #[tokio::test]
    async fn test_fee_and_nonce_are_charged() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        let tx = post_tx(&alice, 0, "Hello, world!", "hello");
        let fee = tx.tx.call.gas();

        ledger.submit(tx).await.unwrap();
        assert_eq!(ledger.balance(&address(&alice)).await, 1_000_000 - fee);
        assert_eq!(ledger.nonce(&address(&alice)).await, 1);
    }

    #[tokio::test]
    async fn test_wrong_chain_rejected() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        let mut tx = post_tx(&alice, 0, "x", "y").tx;
        tx.chain_id = 11_155_111;
        let err = ledger.submit(tx.sign(&alice).unwrap()).await.unwrap_err();
        assert!(matches!(err, LedgerError::WrongChain { expected: CHAIN, actual: 11_155_111 }));
        assert_eq!(ledger.head().await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_funds_appends_nothing() {
        let broke = key(2);
        let ledger = DevLedger::new(params());
        let err = ledger.submit(post_tx(&broke, 0, "x", "y")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { available: 0, .. }));
        assert!(ledger.logs(&all()).await.is_empty());
        assert_eq!(ledger.nonce(&address(&broke)).await, 0);
    }

    #[tokio::test]
    async fn test_replayed_transaction_rejected() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        let tx = post_tx(&alice, 0, "x", "y");
        ledger.submit(tx.clone()).await.unwrap();
        let err = ledger.submit(tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::NonceMismatch { expected: 1, actual: 0, .. }));
        assert_eq!(ledger.logs(&all()).await.len(), 1);
    }

    #[tokio::test]
    async fn test_author_is_signer_not_caller_supplied() {
        let alice = key(1);
        let mallory = key(3);
        let ledger = funded(&alice).await;

        // Mallory swaps in Alice's public key over her own signature.
        let mut forged = post_tx(&mallory, 0, "I am Alice", "spoof");
        forged.public_key = alice.verifying_key().to_bytes();
        assert!(matches!(ledger.submit(forged).await, Err(LedgerError::InvalidSignature(_))));
        assert!(ledger.logs(&all()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_contract_rejected() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        let mut tx = post_tx(&alice, 0, "x", "y").tx;
        tx.to = Address([0xdd; 20]);
        let err = ledger.submit(tx.sign(&alice).unwrap()).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownContract(_)));
    }

    #[tokio::test]
    async fn test_range_bounds_are_inclusive() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        for i in 0..4 {
            ledger.submit(post_tx(&alice, i, &format!("post {}", i), "t")).await.unwrap();
        }

        let range = LogFilter::new(BlockTag::Number(2), BlockTag::Number(3));
        let logs = ledger.logs(&range).await;
        assert_eq!(logs.iter().map(|l| l.block_number).collect::<Vec<_>>(), vec![2, 3]);

        let inverted = LogFilter::new(BlockTag::Number(3), BlockTag::Number(2));
        assert!(ledger.logs(&inverted).await.is_empty());

        let future = LogFilter::new(BlockTag::Number(10), BlockTag::Latest);
        assert!(ledger.logs(&future).await.is_empty());
    }

    #[tokio::test]
    async fn test_finalized_lags_head() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        for i in 0..3 {
            ledger.submit(post_tx(&alice, i, "p", "t")).await.unwrap();
        }
        assert_eq!(ledger.resolve(BlockTag::Finalized).await, 1);
        let finalized = LogFilter::new(BlockTag::Earliest, BlockTag::Finalized);
        assert_eq!(ledger.logs(&finalized).await.len(), 1);
    }

    #[tokio::test]
    async fn test_blocks_chain_by_parent_hash() {
        let alice = key(1);
        let ledger = funded(&alice).await;
        ledger.submit(post_tx(&alice, 0, "a", "t")).await.unwrap();
        ledger.submit(post_tx(&alice, 1, "b", "t")).await.unwrap();
        let one = ledger.block(1).await.unwrap();
        let two = ledger.block(2).await.unwrap();
        assert_eq!(two.parent_hash, one.hash);
        assert_ne!(one.hash, two.hash);
    }

    #[tokio::test]
    async fn test_journal_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.bin");
        let alice = key(1);

        {
            let ledger = DevLedger::open(params(), &path).unwrap();
            ledger.fund(address(&alice), 1_000_000).await.unwrap();
            ledger.submit(post_tx(&alice, 0, "persisted", "disk")).await.unwrap();
        }

        let ledger = DevLedger::open(params(), &path).unwrap();
        assert_eq!(ledger.head().await, 1);
        assert_eq!(ledger.nonce(&address(&alice)).await, 1);
        let logs = ledger.logs(&all()).await;
        assert_eq!(NewPost::from_log(&logs[0]).unwrap().content, "persisted");

        ledger.submit(post_tx(&alice, 1, "after reopen", "disk")).await.unwrap();
        assert_eq!(ledger.logs(&all()).await.len(), 2);
    }
}
