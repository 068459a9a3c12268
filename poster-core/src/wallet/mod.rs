/*
    wallet - Wallet connection and network gating

    Submodules:
    - provider: the wallet RPC surface (`WalletProvider`) and its error codes
    - machine: the pure connection/network state machine
    - handle: the actor that runs the machine against a provider
    - dev_wallet: in-process provider backed by development ledgers
*/

pub mod dev_wallet;
pub mod handle;
pub mod machine;
pub mod provider;

pub use dev_wallet::{dev_account, DevWallet, DevWalletBehaviour, WalletCall};
pub use handle::{ConnectionError, ConnectionHandle, ConnectionOptions, SessionSnapshot};
pub use machine::{ConnectionMachine, ConnectionState, Effect, Input, MachineConfig, Notice, Phase};
pub use provider::{PostRequest, ProviderError, ProviderResult, SharedProvider, WalletProvider};
