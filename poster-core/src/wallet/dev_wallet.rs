//! In-process wallet for development and tests.
//!
//! Holds ed25519 accounts, a registry of known networks and one reachable
//! ledger per network. Transactions are signed for the wallet's *active*
//! network and submitted to that network's ledger, so a post sent while the
//! wallet is on another network really ends up there (or is rejected there).

use super::provider::{PostRequest, ProviderError, ProviderResult, WalletProvider};
use crate::config::NetworkDescriptor;
use crate::ledger::{DevLedger, PostCall, Receipt, UnsignedTransaction};
use crate::primitives::{format_chain_id, keccak256, Address, ChainId};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Deterministic development key for a named account
pub fn dev_account(name: &str) -> SigningKey {
    let seed = keccak256(format!("poster-dev:{}", name).as_bytes());
    SigningKey::from_bytes(&seed.0)
}

/// Simulated user decisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevWalletBehaviour {
    pub reject_accounts: bool,
    pub reject_switch: bool,
    pub reject_registration: bool,
    pub reject_transactions: bool,
    /// Accept switch requests without changing network
    pub ignore_switch: bool,
}

/// Requests the wallet has received, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletCall {
    RequestAccounts,
    ChainId,
    SwitchChain(ChainId),
    AddChain(ChainId),
    SendPost { chain_id: ChainId },
}

struct DevWalletState {
    accounts: Vec<SigningKey>,
    active_chain: ChainId,
    known_networks: HashSet<ChainId>,
    ledgers: HashMap<ChainId, Arc<DevLedger>>,
    behaviour: DevWalletBehaviour,
    calls: Vec<WalletCall>,
}

pub struct DevWallet {
    state: Mutex<DevWalletState>,
    // Serializes nonce lookup and submission
    send_lock: Mutex<()>,
    chain_tx: broadcast::Sender<ChainId>,
}

impl DevWallet {
    /// A wallet pointed at `active_chain`, which it knows about
    pub fn new(active_chain: ChainId) -> Self {
        let (chain_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(DevWalletState {
                accounts: Vec::new(),
                active_chain,
                known_networks: HashSet::from([active_chain]),
                ledgers: HashMap::new(),
                behaviour: DevWalletBehaviour::default(),
                calls: Vec::new(),
            }),
            send_lock: Mutex::new(()),
            chain_tx,
        }
    }

    pub fn with_account(mut self, key: SigningKey) -> Self {
        self.state.get_mut().accounts.push(key);
        self
    }

    /// Make a ledger reachable; its network becomes known to the wallet
    pub fn with_ledger(mut self, ledger: Arc<DevLedger>) -> Self {
        let state = self.state.get_mut();
        state.known_networks.insert(ledger.chain_id());
        state.ledgers.insert(ledger.chain_id(), ledger);
        self
    }

    pub fn with_behaviour(mut self, behaviour: DevWalletBehaviour) -> Self {
        self.state.get_mut().behaviour = behaviour;
        self
    }

    pub async fn set_behaviour(&self, behaviour: DevWalletBehaviour) {
        self.state.lock().await.behaviour = behaviour;
    }

    /// Drop a network from the registry so switching to it fails with 4902
    pub async fn forget_network(&self, chain_id: ChainId) {
        self.state.lock().await.known_networks.remove(&chain_id);
    }

    pub async fn addresses(&self) -> Vec<Address> {
        let state = self.state.lock().await;
        state.accounts.iter().map(|k| Address::from_verifying_key(&k.verifying_key())).collect()
    }

    pub async fn active_chain(&self) -> ChainId {
        self.state.lock().await.active_chain
    }

    pub async fn calls(&self) -> Vec<WalletCall> {
        self.state.lock().await.calls.clone()
    }

    /// Change network from inside the wallet, as a user would in its UI
    pub async fn select_network(&self, chain_id: ChainId) {
        let mut state = self.state.lock().await;
        state.known_networks.insert(chain_id);
        self.activate(&mut state, chain_id);
    }

    fn activate(&self, state: &mut DevWalletState, chain_id: ChainId) {
        if state.active_chain != chain_id {
            state.active_chain = chain_id;
            debug!(chain = %format_chain_id(chain_id), "Dev wallet changed network");
            let _ = self.chain_tx.send(chain_id);
        }
    }
}

#[async_trait]
impl WalletProvider for DevWallet {
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        let mut state = self.state.lock().await;
        state.calls.push(WalletCall::RequestAccounts);
        if state.behaviour.reject_accounts {
            return Err(ProviderError::user_rejected());
        }
        Ok(state.accounts.iter().map(|k| Address::from_verifying_key(&k.verifying_key())).collect())
    }

    async fn chain_id(&self) -> ProviderResult<ChainId> {
        let mut state = self.state.lock().await;
        state.calls.push(WalletCall::ChainId);
        Ok(state.active_chain)
    }

    async fn switch_chain(&self, chain_id: ChainId) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(WalletCall::SwitchChain(chain_id));
        if state.behaviour.reject_switch {
            return Err(ProviderError::user_rejected());
        }
        if !state.known_networks.contains(&chain_id) {
            return Err(ProviderError::unknown_chain(chain_id));
        }
        if !state.behaviour.ignore_switch {
            self.activate(&mut state, chain_id);
        }
        Ok(())
    }

    async fn add_chain(&self, network: &NetworkDescriptor) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(WalletCall::AddChain(network.chain_id));
        if state.behaviour.reject_registration {
            return Err(ProviderError::user_rejected());
        }
        info!(chain = %network.chain_id_hex(), name = %network.chain_name, "Dev wallet registered network");
        state.known_networks.insert(network.chain_id);
        if !state.behaviour.ignore_switch {
            self.activate(&mut state, network.chain_id);
        }
        Ok(())
    }

    async fn send_post(&self, request: PostRequest) -> ProviderResult<Receipt> {
        let _sending = self.send_lock.lock().await;

        let (key, ledger, chain_id) = {
            let mut state = self.state.lock().await;
            let chain_id = state.active_chain;
            state.calls.push(WalletCall::SendPost { chain_id });
            if state.behaviour.reject_transactions {
                return Err(ProviderError::user_rejected());
            }
            let key = state
                .accounts
                .iter()
                .find(|k| Address::from_verifying_key(&k.verifying_key()) == request.from)
                .cloned()
                .ok_or_else(|| ProviderError::unauthorized(&request.from))?;
            let ledger = state.ledgers.get(&chain_id).cloned().ok_or_else(|| {
                ProviderError::internal(format!("No node reachable for chain {}", format_chain_id(chain_id)))
            })?;
            (key, ledger, chain_id)
        };

        let tx = UnsignedTransaction {
            chain_id,
            nonce: ledger.nonce(&request.from).await,
            to: request.to,
            gas_price: ledger.gas_price(),
            call: PostCall::new(request.content, request.tag),
        };
        let signed = tx.sign(&key).map_err(|e| ProviderError::internal(e.to_string()))?;
        ledger
            .submit(signed)
            .await
            .map_err(|e| ProviderError::new(ProviderError::TRANSACTION_REJECTED, e.to_string()))
    }

    fn subscribe_chain_changes(&self) -> broadcast::Receiver<ChainId> {
        self.chain_tx.subscribe()
    }
}
