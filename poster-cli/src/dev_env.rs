//! Local development environment behind the CLI: one journaled ledger for
//! the required network and a development wallet holding one named account.

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use poster_core::client::PosterClient;
use poster_core::config::Config;
use poster_core::ledger::{DevLedger, LedgerParams};
use poster_core::primitives::{Address, ChainId};
use poster_core::query::PostQuery;
use poster_core::tag::TagIndex;
use poster_core::wallet::{dev_account, ConnectionHandle, ConnectionOptions, DevWallet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct DevEnv {
    pub config: Config,
    pub ledger: Arc<DevLedger>,
    pub key: SigningKey,
    pub account: Address,
}

/// Journal location: configured path, or one file per chain under `data_dir`
pub fn journal_path(config: &Config, data_dir: &Path) -> PathBuf {
    config.ledger.journal_path.clone().unwrap_or_else(|| {
        data_dir.join(format!("chain-{}", config.network.chain_id)).join("journal.bin")
    })
}

impl DevEnv {
    pub async fn open(config: Config, data_dir: &Path, account_name: &str) -> Result<Self> {
        let params = LedgerParams {
            chain_id: config.network.chain_id,
            contract: config.contract.address,
            gas_price: config.ledger.gas_price,
            finality_depth: config.ledger.finality_depth,
        };
        let path = journal_path(&config, data_dir);
        let ledger = DevLedger::open(params, &path)
            .with_context(|| format!("failed to open ledger journal at {}", path.display()))?;

        let key = dev_account(account_name);
        let account = Address::from_verifying_key(&key.verifying_key());
        if ledger.balance(&account).await == 0 && ledger.nonce(&account).await == 0 {
            ledger.fund(account, config.ledger.dev_funding).await?;
            info!(%account, amount = config.ledger.dev_funding, "Funded development account");
        }

        Ok(Self { config, ledger: Arc::new(ledger), key, account })
    }

    pub fn query(&self) -> PostQuery {
        PostQuery::new(self.ledger.clone(), self.config.contract.address)
    }

    pub fn tag_index(&self) -> TagIndex {
        TagIndex::new(self.config.client.tag_policy)
    }

    /// A wallet pointed at `active_chain` that can reach the required ledger
    pub fn wallet(&self, active_chain: ChainId) -> Arc<DevWallet> {
        Arc::new(DevWallet::new(active_chain).with_account(self.key.clone()).with_ledger(self.ledger.clone()))
    }

    pub fn client(&self, wallet: Arc<DevWallet>) -> (PosterClient, JoinHandle<()>) {
        let (connection, task) = ConnectionHandle::spawn(
            Some(wallet.clone()),
            self.config.network.clone(),
            ConnectionOptions::from(&self.config.client),
        );
        (PosterClient::new(connection, Some(wallet), self.query(), self.tag_index()), task)
    }
}
