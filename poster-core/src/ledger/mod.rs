/*
    ledger - The record store and the chain it lives on

    The record store accepts `post(content, tag)`, stamps the verified sender
    as author and emits exactly one immutable `NewPost` entry per accepted
    call. Nothing is ever edited or removed.

    Submodules:
    - types: blocks, log entries, filters, receipts
    - event: NewPost topics and ABI payload codec
    - transaction: signed post calls and gas accounting
    - chain: auto-mining development ledger
    - journal: CRC-checked append-only persistence
*/

pub mod chain;
pub mod errors;
pub mod event;
pub mod journal;
pub mod transaction;
pub mod types;

pub use chain::{DevLedger, LedgerParams};
pub use errors::{LedgerError, LedgerResult};
pub use event::{new_post_topic, NewPost, NEW_POST_SIGNATURE};
pub use transaction::{PostCall, SignedTransaction, UnsignedTransaction};
pub use types::{Block, BlockTag, LogEntry, LogFilter, Receipt};
