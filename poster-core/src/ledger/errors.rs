/*
    errors.rs - Error types for the ledger subsystem

    A rejected transaction leaves the chain untouched: every variant raised
    by `DevLedger::submit` is returned before anything is appended.
*/

use crate::primitives::{Address, ChainId};
use thiserror::Error;

/// Errors that can occur in the ledger subsystem
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transaction signed for another network
    #[error("Wrong chain: expected {expected}, got {actual}")]
    WrongChain { expected: ChainId, actual: ChainId },

    /// Signature does not verify against the embedded key
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Nonce already used or skipped
    #[error("Nonce mismatch for {account}: expected {expected}, got {actual}")]
    NonceMismatch { account: Address, expected: u64, actual: u64 },

    /// Sender cannot pay the fee
    #[error("Insufficient funds for {account}: fee {required}, balance {available}")]
    InsufficientFunds { account: Address, required: u64, available: u64 },

    /// Gas price below the ledger's minimum
    #[error("Transaction underpriced: minimum {minimum}, offered {offered}")]
    Underpriced { minimum: u64, offered: u64 },

    /// No record store deployed at the target address
    #[error("No contract at {0}")]
    UnknownContract(Address),

    /// Log payload does not decode
    #[error("Malformed log entry: {0}")]
    MalformedLog(String),

    /// Journal I/O error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Journal checksum or framing failure
    #[error("Corrupted journal: {0}")]
    CorruptedJournal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
