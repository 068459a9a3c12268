/*
   ConnectionHandle

   Single entry point for the client to drive the connection state machine.

   One actor task owns the `ConnectionMachine`. Everything that can change the
   session arrives through its one inbox, one message at a time:

     - user commands (connect, switch) sent by the handle
     - network changes forwarded from the wallet's notification stream
     - results of wallet calls the actor spawned for earlier effects

   Results of wallet calls are tagged with the attempt that issued them, so
   the machine can drop anything a later attempt superseded.

    ┌───────────────────┐   connect / switch   ┌─────────────────────────┐
    │  ConnectionHandle │ ───────────────────► │     ConnectionActor     │
    │  snapshot()       │ ◄─── watch ───────── │  ConnectionMachine      │
    │  notices()        │ ◄─── broadcast ───── │  (one transition fn)    │
    └───────────────────┘                      └────┬──────────────▲─────┘
                                                    │ effects      │ results
                                               ┌────▼──────────────┴─────┐
                                               │     WalletProvider      │
                                               └─────────────────────────┘
*/

use super::machine::{ConnectionMachine, ConnectionState, Effect, Input, MachineConfig, Notice};
use super::provider::SharedProvider;
use crate::config::{ClientConfig, NetworkDescriptor};
use crate::primitives::{Address, ChainId};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection actor has stopped")]
    ActorStopped,
}

/// Actor options taken from the client configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub switch_grace: Duration,
    pub replay_connect_on_reload: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for ConnectionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self { switch_grace: config.switch_grace, replay_connect_on_reload: config.replay_connect_on_reload }
    }
}

/// Read-only view of the connection session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub signer: Option<Address>,
    pub active_chain: Option<ChainId>,
    pub required_chain: ChainId,
    pub is_network_valid: bool,
}

impl SessionSnapshot {
    fn of(machine: &ConnectionMachine) -> Self {
        Self {
            state: machine.state(),
            signer: machine.signer(),
            active_chain: machine.active_chain(),
            required_chain: machine.required_chain(),
            is_network_valid: machine.is_network_valid(),
        }
    }

    /// Writes are allowed only here
    pub fn can_write(&self) -> bool {
        self.state == ConnectionState::ConnectedCorrectNetwork && self.is_network_valid && self.signer.is_some()
    }
}

#[derive(Debug)]
enum ConnectionMessage {
    /// Wallet notification or wallet call result
    Input(Input),
    /// User command; acknowledged once the transition has been applied
    Command { input: Input, ack: oneshot::Sender<()> },
    Shutdown,
}

/// Handle to the connection actor
#[derive(Clone)]
pub struct ConnectionHandle {
    command_tx: mpsc::Sender<ConnectionMessage>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
}

impl ConnectionHandle {
    /// Create the state machine and spawn its actor
    pub fn spawn(
        provider: Option<SharedProvider>,
        network: NetworkDescriptor,
        options: ConnectionOptions,
    ) -> (Self, JoinHandle<()>) {
        let machine = ConnectionMachine::new(MachineConfig {
            required_chain: network.chain_id,
            provider_present: provider.is_some(),
            switch_grace: options.switch_grace,
            replay_connect_on_reload: options.replay_connect_on_reload,
        });

        let (command_tx, command_rx) = mpsc::channel(100);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::of(&machine));
        let (notice_tx, _) = broadcast::channel(64);

        let forwarder = provider
            .as_ref()
            .map(|p| spawn_chain_forwarder(p.subscribe_chain_changes(), command_tx.downgrade()));

        let actor = ConnectionActor {
            machine,
            provider,
            network,
            command_rx,
            loopback: command_tx.downgrade(),
            snapshot_tx,
            notice_tx: notice_tx.clone(),
            forwarder,
        };
        let handle = actor.spawn();

        (ConnectionHandle { command_tx, snapshot_rx, notice_tx }, handle)
    }

    async fn command(&self, input: Input) -> Result<(), ConnectionError> {
        let (ack, ack_rx) = oneshot::channel();
        self.command_tx
            .send(ConnectionMessage::Command { input, ack })
            .await
            .map_err(|_| ConnectionError::ActorStopped)?;
        ack_rx.await.map_err(|_| ConnectionError::ActorStopped)
    }

    /// Ask to connect; returns once the request has been applied
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.command(Input::Connect).await
    }

    /// Ask to move to the required network
    pub async fn switch_network(&self) -> Result<(), ConnectionError> {
        self.command(Input::Switch).await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notice_tx.subscribe()
    }

    /// Wait until no connect or switch attempt is in flight
    pub async fn wait_until_settled(&self) -> Result<SessionSnapshot, ConnectionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| s.state != ConnectionState::ConnectingOrSwitching)
            .await
            .map_err(|_| ConnectionError::ActorStopped)?;
        Ok(snapshot.clone())
    }

    pub async fn shutdown(&self) -> Result<(), ConnectionError> {
        self.command_tx.send(ConnectionMessage::Shutdown).await.map_err(|_| ConnectionError::ActorStopped)
    }
}

fn spawn_chain_forwarder(
    mut changes: broadcast::Receiver<ChainId>,
    inbox: mpsc::WeakSender<ConnectionMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(chain_id) => {
                    let Some(tx) = inbox.upgrade() else { break };
                    if tx.send(ConnectionMessage::Input(Input::ChainChanged(chain_id))).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed wallet network notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

struct ConnectionActor {
    machine: ConnectionMachine,
    provider: Option<SharedProvider>,
    network: NetworkDescriptor,
    command_rx: mpsc::Receiver<ConnectionMessage>,
    loopback: mpsc::WeakSender<ConnectionMessage>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    notice_tx: broadcast::Sender<Notice>,
    forwarder: Option<JoinHandle<()>>,
}

impl ConnectionActor {
    fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        while let Some(message) = self.command_rx.recv().await {
            match message {
                ConnectionMessage::Input(input) => self.apply(input),
                ConnectionMessage::Command { input, ack } => {
                    self.apply(input);
                    let _ = ack.send(());
                }
                ConnectionMessage::Shutdown => break,
            }
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        debug!("Connection actor stopped");
    }

    fn apply(&mut self, input: Input) {
        let effects = self.machine.handle(input);
        for effect in effects {
            self.execute(effect);
        }
        self.snapshot_tx.send_replace(SessionSnapshot::of(&self.machine));
    }

    fn execute(&self, effect: Effect) {
        if let Effect::Notify(notice) = effect {
            match &notice {
                Notice::Connected(account) => info!(%account, "Wallet connected"),
                Notice::Error(message) => warn!(%message, "Wallet request failed"),
                other => info!(notice = %other, "Connection notice"),
            }
            let _ = self.notice_tx.send(notice);
            return;
        }

        let (Some(provider), Some(tx)) = (self.provider.clone(), self.loopback.upgrade()) else {
            return;
        };
        let network = self.network.clone();

        tokio::spawn(async move {
            let input = match effect {
                Effect::QueryChain { attempt } => {
                    Input::ChainObserved { attempt, result: provider.chain_id().await }
                }
                Effect::RequestAccounts { attempt } => {
                    Input::AccountsResult { attempt, result: provider.request_accounts().await }
                }
                Effect::RequestSwitch { attempt, chain_id } => {
                    Input::SwitchResult { attempt, result: provider.switch_chain(chain_id).await }
                }
                Effect::RequestRegistration { attempt } => {
                    Input::RegistrationResult { attempt, result: provider.add_chain(&network).await }
                }
                Effect::ScheduleRecheck { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    Input::RecheckDue { attempt }
                }
                Effect::Notify(_) => return,
            };
            let _ = tx.send(ConnectionMessage::Input(input)).await;
        });
    }
}
