//! Test fixtures for creating common test objects

use crate::client::PosterClient;
use crate::config::{NativeCurrency, NetworkDescriptor};
use crate::ledger::{DevLedger, LedgerParams, PostCall, Receipt, UnsignedTransaction};
use crate::primitives::{Address, ChainId};
use crate::query::PostQuery;
use crate::tag::{TagIndex, TagPolicy};
use crate::wallet::{dev_account, ConnectionHandle, ConnectionOptions, DevWallet, SharedProvider};
use ed25519_dalek::SigningKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Network the client requires in tests
pub const TEST_CHAIN: ChainId = 1337;
/// Some other network the wallet can be pointed at
pub const OTHER_CHAIN: ChainId = 5;
pub const TEST_CONTRACT: Address = Address([0xc0; 20]);
/// Enough for a few hundred short posts at gas price 1
pub const TEST_FUNDING: u64 = 10_000_000;

pub fn test_network(chain_id: ChainId) -> NetworkDescriptor {
    NetworkDescriptor {
        chain_id,
        chain_name: "Poster Devnet".to_string(),
        rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
        native_currency: NativeCurrency { name: "Dev Ether".to_string(), symbol: "ETH".to_string(), decimals: 18 },
        block_explorer_urls: vec![],
    }
}

/// Connection options with a short grace delay
pub fn fast_options() -> ConnectionOptions {
    ConnectionOptions { switch_grace: Duration::from_millis(10), replay_connect_on_reload: true }
}

pub fn test_ledger(chain_id: ChainId) -> Arc<DevLedger> {
    Arc::new(DevLedger::new(LedgerParams { chain_id, contract: TEST_CONTRACT, gas_price: 1, finality_depth: 0 }))
}

/// A required-network ledger, a second network's ledger and a funded wallet
pub struct TestWorld {
    pub ledger: Arc<DevLedger>,
    pub other_ledger: Arc<DevLedger>,
    pub wallet: Arc<DevWallet>,
    pub key: SigningKey,
    pub account: Address,
    pub network: NetworkDescriptor,
}

impl TestWorld {
    /// Wallet starts on the required network
    pub async fn new() -> Self {
        Self::on_chain(TEST_CHAIN).await
    }

    /// Wallet starts on `active_chain`
    pub async fn on_chain(active_chain: ChainId) -> Self {
        let key = dev_account("alice");
        let account = Address::from_verifying_key(&key.verifying_key());

        let ledger = test_ledger(TEST_CHAIN);
        let other_ledger = test_ledger(OTHER_CHAIN);
        for l in [&ledger, &other_ledger] {
            if let Err(e) = l.fund(account, TEST_FUNDING).await {
                panic!("funding test account failed: {}", e);
            }
        }

        let wallet = DevWallet::new(active_chain)
            .with_account(key.clone())
            .with_ledger(ledger.clone())
            .with_ledger(other_ledger.clone());

        Self { ledger, other_ledger, wallet: Arc::new(wallet), key, account, network: test_network(TEST_CHAIN) }
    }

    pub fn provider(&self) -> SharedProvider {
        self.wallet.clone()
    }

    pub fn connection(&self, options: ConnectionOptions) -> (ConnectionHandle, JoinHandle<()>) {
        ConnectionHandle::spawn(Some(self.provider()), self.network.clone(), options)
    }

    pub fn client(&self, options: ConnectionOptions, policy: TagPolicy) -> (PosterClient, JoinHandle<()>) {
        let (connection, task) = self.connection(options);
        let query = PostQuery::new(self.ledger.clone(), TEST_CONTRACT);
        (PosterClient::new(connection, Some(self.provider()), query, TagIndex::new(policy)), task)
    }

    /// Append posts straight to the required ledger, bypassing the wallet
    pub async fn seed_posts(&self, posts: &[(&str, &str)]) -> Vec<Receipt> {
        let mut receipts = Vec::with_capacity(posts.len());
        for (content, tag) in posts {
            let tx = UnsignedTransaction {
                chain_id: TEST_CHAIN,
                nonce: self.ledger.nonce(&self.account).await,
                to: TEST_CONTRACT,
                gas_price: self.ledger.gas_price(),
                call: PostCall::new(*content, *tag),
            };
            let result = match tx.sign(&self.key) {
                Ok(signed) => self.ledger.submit(signed).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => panic!("seeding post failed: {}", e),
            }
        }
        receipts
    }
}
