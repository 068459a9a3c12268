/*
    machine.rs - Connection/network state machine

    Pure transition logic. `ConnectionMachine::handle` takes one input
    (a user command, a wallet notification or the result of a wallet call)
    and returns the effects to run. It never performs I/O itself; the actor
    in `handle.rs` executes effects and feeds their results back in.

    States:

        Disconnected ──connect──► ConnectingOrSwitching ──► ConnectedCorrectNetwork
             ▲                      │        ▲                    │
             │ chain/accounts error │        │ switch             │ chain changed away
             └──────────────────────┘        │                    ▼
                                       ConnectedWrongNetwork ◄────┘

    Inside ConnectingOrSwitching a `Phase` tracks which wallet call is in
    flight. Every attempt carries a number; results tagged with an older
    attempt are dropped, so a reload or a second connect never acts on a
    stale answer.
*/

use super::provider::ProviderError;
use crate::primitives::{format_chain_id, Address, ChainId};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Externally visible connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    ConnectingOrSwitching,
    ConnectedWrongNetwork,
    ConnectedCorrectNetwork,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::ConnectingOrSwitching => "connecting",
            ConnectionState::ConnectedWrongNetwork => "wrong-network",
            ConnectionState::ConnectedCorrectNetwork => "connected",
        };
        f.write_str(name)
    }
}

/// Wallet call in flight while connecting or switching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CheckingNetwork,
    Switching,
    Registering,
    AwaitingRecheck,
    RequestingAccounts,
}

/// Everything the machine reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// User asked to connect
    Connect,
    /// User asked to move to the required network
    Switch,
    /// Wallet reported a network change
    ChainChanged(ChainId),
    ChainObserved { attempt: u64, result: Result<ChainId, ProviderError> },
    AccountsResult { attempt: u64, result: Result<Vec<Address>, ProviderError> },
    SwitchResult { attempt: u64, result: Result<(), ProviderError> },
    RegistrationResult { attempt: u64, result: Result<(), ProviderError> },
    /// The post-switch grace delay elapsed
    RecheckDue { attempt: u64 },
}

/// User-facing messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No wallet is installed
    InstallWallet,
    Connected(Address),
    WrongNetwork { active: ChainId, required: ChainId },
    Error(String),
    /// Session was reset after the wallet moved onto the required network
    Reloaded,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::InstallWallet => write!(f, "Please install a wallet to continue"),
            Notice::Connected(account) => write!(f, "Connected as {}", account),
            Notice::WrongNetwork { active, required } => write!(
                f,
                "Wrong network: wallet is on {}, switch to {}",
                format_chain_id(*active),
                format_chain_id(*required)
            ),
            Notice::Error(message) => write!(f, "{}", message),
            Notice::Reloaded => write!(f, "Network changed, session reloaded"),
        }
    }
}

/// Work the actor performs on the machine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    QueryChain { attempt: u64 },
    RequestAccounts { attempt: u64 },
    RequestSwitch { attempt: u64, chain_id: ChainId },
    /// Register the configured network descriptor with the wallet
    RequestRegistration { attempt: u64 },
    ScheduleRecheck { attempt: u64, delay: Duration },
    Notify(Notice),
}

/// Tunables of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub required_chain: ChainId,
    pub provider_present: bool,
    pub switch_grace: Duration,
    pub replay_connect_on_reload: bool,
}

pub struct ConnectionMachine {
    config: MachineConfig,
    state: ConnectionState,
    phase: Option<Phase>,
    attempt: u64,
    signer: Option<Address>,
    active_chain: Option<ChainId>,
    connect_requested: bool,
    registration_tried: bool,
}

impl ConnectionMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            phase: None,
            attempt: 0,
            signer: None,
            active_chain: None,
            connect_requested: false,
            registration_tried: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn active_chain(&self) -> Option<ChainId> {
        self.active_chain
    }

    pub fn required_chain(&self) -> ChainId {
        self.config.required_chain
    }

    pub fn is_network_valid(&self) -> bool {
        self.active_chain == Some(self.config.required_chain)
    }

    pub fn connect_requested(&self) -> bool {
        self.connect_requested
    }

    /// Apply one input and return the effects it produces
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let before = self.state;
        let effects = match input {
            Input::Connect => self.on_connect(),
            Input::Switch => self.on_switch(),
            Input::ChainChanged(chain_id) => self.on_chain_changed(chain_id),
            Input::ChainObserved { attempt, result } => {
                if self.is_current(attempt, &[Phase::CheckingNetwork, Phase::AwaitingRecheck]) {
                    self.on_chain_observed(result)
                } else {
                    self.stale("chain query", attempt)
                }
            }
            Input::AccountsResult { attempt, result } => {
                if self.is_current(attempt, &[Phase::RequestingAccounts]) {
                    self.on_accounts(result)
                } else {
                    self.stale("accounts request", attempt)
                }
            }
            Input::SwitchResult { attempt, result } => {
                if self.is_current(attempt, &[Phase::Switching]) {
                    self.on_switch_result(result)
                } else {
                    self.stale("switch request", attempt)
                }
            }
            Input::RegistrationResult { attempt, result } => {
                if self.is_current(attempt, &[Phase::Registering]) {
                    self.on_registration_result(result)
                } else {
                    self.stale("registration request", attempt)
                }
            }
            Input::RecheckDue { attempt } => {
                if self.is_current(attempt, &[Phase::AwaitingRecheck]) {
                    vec![Effect::QueryChain { attempt }]
                } else {
                    self.stale("recheck", attempt)
                }
            }
        };

        if before != self.state {
            crate::metrics::record_counter("wallet.transitions", 1);
            debug!(from = %before, to = %self.state, attempt = self.attempt, "Connection state changed");
        }
        effects
    }

    fn is_current(&self, attempt: u64, phases: &[Phase]) -> bool {
        attempt == self.attempt && self.phase.is_some_and(|phase| phases.contains(&phase))
    }

    fn stale(&self, what: &str, attempt: u64) -> Vec<Effect> {
        debug!(what, attempt, current = self.attempt, "Dropping stale wallet result");
        Vec::new()
    }

    fn begin_attempt(&mut self) -> Vec<Effect> {
        self.attempt += 1;
        self.registration_tried = false;
        self.state = ConnectionState::ConnectingOrSwitching;
        self.phase = Some(Phase::CheckingNetwork);
        vec![Effect::QueryChain { attempt: self.attempt }]
    }

    fn on_connect(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::ConnectedWrongNetwork => {
                self.connect_requested = true;
                if !self.config.provider_present {
                    return vec![Effect::Notify(Notice::InstallWallet)];
                }
                self.begin_attempt()
            }
            ConnectionState::ConnectingOrSwitching | ConnectionState::ConnectedCorrectNetwork => Vec::new(),
        }
    }

    fn on_switch(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::ConnectedWrongNetwork {
            self.begin_attempt()
        } else {
            debug!(state = %self.state, "Ignoring switch request");
            Vec::new()
        }
    }

    fn on_chain_changed(&mut self, chain_id: ChainId) -> Vec<Effect> {
        let previous = self.active_chain.replace(chain_id);
        let required = self.config.required_chain;

        if chain_id == required && previous != Some(required) {
            return self.reload();
        }

        if chain_id == required {
            return Vec::new();
        }

        match self.state {
            ConnectionState::ConnectedCorrectNetwork => {
                self.state = ConnectionState::ConnectedWrongNetwork;
                vec![Effect::Notify(Notice::WrongNetwork { active: chain_id, required })]
            }
            // A chain answer already in flight may predate the change, so ask again
            ConnectionState::ConnectingOrSwitching if self.phase == Some(Phase::CheckingNetwork) => {
                self.begin_attempt()
            }
            ConnectionState::ConnectingOrSwitching => {
                debug!(chain = chain_id, phase = ?self.phase, "Wallet left the required network mid-attempt");
                self.attempt += 1;
                self.settle_wrong_network(None)
            }
            ConnectionState::Disconnected | ConnectionState::ConnectedWrongNetwork => Vec::new(),
        }
    }

    /// Reset the session as a page reload would, then replay a requested connect
    fn reload(&mut self) -> Vec<Effect> {
        self.attempt += 1;
        self.state = ConnectionState::Disconnected;
        self.phase = None;
        self.signer = None;
        self.registration_tried = false;

        let mut effects = vec![Effect::Notify(Notice::Reloaded)];
        let replay =
            self.connect_requested && self.config.replay_connect_on_reload && self.config.provider_present;
        if replay {
            effects.extend(self.begin_attempt());
        } else {
            self.connect_requested = false;
        }
        effects
    }

    fn on_chain_observed(&mut self, result: Result<ChainId, ProviderError>) -> Vec<Effect> {
        let chain_id = match result {
            Ok(chain_id) => chain_id,
            Err(e) => return self.fail_disconnected(e),
        };
        self.active_chain = Some(chain_id);

        if chain_id == self.config.required_chain {
            self.phase = Some(Phase::RequestingAccounts);
            return vec![Effect::RequestAccounts { attempt: self.attempt }];
        }

        if self.phase == Some(Phase::CheckingNetwork) {
            self.phase = Some(Phase::Switching);
            vec![Effect::RequestSwitch { attempt: self.attempt, chain_id: self.config.required_chain }]
        } else {
            self.settle_wrong_network(None)
        }
    }

    fn on_accounts(&mut self, result: Result<Vec<Address>, ProviderError>) -> Vec<Effect> {
        let accounts = match result {
            Ok(accounts) => accounts,
            Err(e) => return self.fail_disconnected(e),
        };
        match accounts.first() {
            Some(account) => {
                self.signer = Some(*account);
                self.state = ConnectionState::ConnectedCorrectNetwork;
                self.phase = None;
                vec![Effect::Notify(Notice::Connected(*account))]
            }
            None => self.fail_disconnected(ProviderError::new(
                ProviderError::UNAUTHORIZED,
                "Wallet returned no accounts",
            )),
        }
    }

    fn on_switch_result(&mut self, result: Result<(), ProviderError>) -> Vec<Effect> {
        match result {
            Ok(()) => self.await_recheck(),
            Err(e) if e.is_unknown_chain() && !self.registration_tried => {
                self.registration_tried = true;
                self.phase = Some(Phase::Registering);
                vec![Effect::RequestRegistration { attempt: self.attempt }]
            }
            Err(e) => self.settle_wrong_network(Some(e)),
        }
    }

    fn on_registration_result(&mut self, result: Result<(), ProviderError>) -> Vec<Effect> {
        match result {
            Ok(()) => self.await_recheck(),
            Err(e) => self.settle_wrong_network(Some(e)),
        }
    }

    fn await_recheck(&mut self) -> Vec<Effect> {
        self.phase = Some(Phase::AwaitingRecheck);
        vec![Effect::ScheduleRecheck { attempt: self.attempt, delay: self.config.switch_grace }]
    }

    fn settle_wrong_network(&mut self, error: Option<ProviderError>) -> Vec<Effect> {
        self.state = ConnectionState::ConnectedWrongNetwork;
        self.phase = None;

        let mut effects = Vec::new();
        if let Some(e) = error {
            effects.push(Effect::Notify(Notice::Error(e.to_string())));
        }
        if let Some(active) = self.active_chain {
            effects.push(Effect::Notify(Notice::WrongNetwork { active, required: self.config.required_chain }));
        }
        effects
    }

    fn fail_disconnected(&mut self, error: ProviderError) -> Vec<Effect> {
        self.state = ConnectionState::Disconnected;
        self.phase = None;
        self.signer = None;
        vec![Effect::Notify(Notice::Error(error.to_string()))]
    }
}
