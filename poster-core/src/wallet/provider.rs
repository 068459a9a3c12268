//! Wallet provider interface.
//!
//! A provider is the user's wallet as seen through its injected RPC surface:
//! it owns the keys, reports and switches the active network, registers new
//! networks and signs and submits transactions. Errors carry the numeric
//! codes wallets use.

use crate::config::NetworkDescriptor;
use crate::ledger::Receipt;
use crate::primitives::{format_chain_id, Address, ChainId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// A failed wallet request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    /// The user declined the request
    pub const USER_REJECTED: i64 = 4001;
    /// The requested account or method has not been authorized
    pub const UNAUTHORIZED: i64 = 4100;
    /// The wallet does not know the requested network
    pub const UNKNOWN_CHAIN: i64 = 4902;
    /// Node rejected the transaction
    pub const TRANSACTION_REJECTED: i64 = -32000;
    pub const INTERNAL: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "User rejected the request")
    }

    pub fn unauthorized(account: &Address) -> Self {
        Self::new(Self::UNAUTHORIZED, format!("Account {} is not authorized", account))
    }

    pub fn unknown_chain(chain_id: ChainId) -> Self {
        Self::new(
            Self::UNKNOWN_CHAIN,
            format!("Unrecognized chain ID {}. Try adding the chain first", format_chain_id(chain_id)),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn is_unknown_chain(&self) -> bool {
        self.code == Self::UNKNOWN_CHAIN
    }

    pub fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A `post(content, tag)` call to be signed by `from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    pub from: Address,
    pub to: Address,
    pub content: String,
    pub tag: String,
}

/// Requests a wallet answers, plus its network-change stream
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the user to authorize accounts; the first is the active one
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>>;

    /// Network the wallet is currently pointed at
    async fn chain_id(&self) -> ProviderResult<ChainId>;

    /// Ask the wallet to change network. Fails with code 4902 when the
    /// network is not registered in the wallet.
    async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()>;

    /// Register a network from its descriptor
    async fn add_chain(&self, network: &NetworkDescriptor) -> ProviderResult<()>;

    /// Sign and submit a post on the wallet's active network
    async fn send_post(&self, request: PostRequest) -> ProviderResult<Receipt>;

    /// Chain ids the wallet switches to, whoever initiated the switch
    fn subscribe_chain_changes(&self) -> broadcast::Receiver<ChainId>;
}

/// Shared provider handle
pub type SharedProvider = Arc<dyn WalletProvider>;
