//! Configuration management for Poster
//!
//! Defaults target the Sepolia test network. Values can be loaded from a
//! TOML file or overridden through `POSTER_<SECTION>_<KEY>` environment
//! variables.

use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::primitives::{format_chain_id, parse_chain_id, Address, ChainId};
use crate::tag::TagPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Record store deployment on Sepolia
pub const DEFAULT_CONTRACT: Address = Address([
    0xc1, 0x91, 0x14, 0x39, 0xd8, 0x1d, 0x4f, 0x7a, 0x1f, 0xe0, 0xeb, 0x17, 0x41, 0x5e, 0x4f, 0x52, 0x60,
    0x6c, 0x09, 0xac,
]);

pub const SEPOLIA_CHAIN_ID: ChainId = 11_155_111;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// The one network writes are allowed on
    pub network: NetworkDescriptor,

    /// Record store location
    pub contract: ContractConfig,

    /// Client behaviour
    pub client: ClientConfig,

    /// Development ledger parameters
    pub ledger: LedgerConfig,

    pub logging: LogConfig,
}

/// Native currency of a network, as wallets display it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything a wallet needs to register a network it does not know
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency: NativeCurrency,
    pub block_explorer_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Wait after an accepted switch before checking the network again
    #[serde(with = "humantime_serde")]
    pub switch_grace: Duration,

    /// Tag normalization applied on both the write and the read path
    pub tag_policy: TagPolicy,

    /// Replay a requested connect after a reload into the required network
    pub replay_connect_on_reload: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Minimum gas price, in wei
    pub gas_price: u64,

    /// Blocks behind the head before `finalized` covers them
    pub finality_depth: u64,

    /// Journal location; an in-memory ledger is used when unset
    pub journal_path: Option<PathBuf>,

    /// Balance granted to each development account on first use
    pub dev_funding: u64,
}

impl Default for NetworkDescriptor {
    fn default() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            chain_name: "Sepolia Test Network".to_string(),
            rpc_urls: vec!["https://ethereum-sepolia-rpc.publicnode.com".to_string()],
            native_currency: NativeCurrency {
                name: "Sepolia ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            block_explorer_urls: vec!["https://sepolia.etherscan.io".to_string()],
        }
    }
}

impl NetworkDescriptor {
    /// Chain id in the `0x`-prefixed form wallets use
    pub fn chain_id_hex(&self) -> String {
        format_chain_id(self.chain_id)
    }
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self { address: DEFAULT_CONTRACT }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            switch_grace: Duration::from_secs(1),
            tag_policy: TagPolicy::Exact,
            replay_connect_on_reload: true,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            gas_price: 1_000_000_000, // 1 gwei
            finality_depth: 0,
            journal_path: None,
            dev_funding: 1_000_000_000_000_000_000, // 1 ETH
        }
    }
}

/// Parse the variable `key`, if set
fn var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue { key, reason: e.to_string() }))
        .transpose()
}

fn list(raw: String) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}

fn ensure(ok: bool, reason: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(reason()))
    }
}

impl Config {
    /// Defaults overridden by `POSTER_<SECTION>_<KEY>` environment variables,
    /// e.g. `POSTER_NETWORK_CHAIN_ID=0xaa36a7`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("POSTER_NETWORK_CHAIN_ID") {
            config.network.chain_id = parse_chain_id(&raw)
                .map_err(|e| ConfigError::InvalidValue { key: "POSTER_NETWORK_CHAIN_ID", reason: e.to_string() })?;
        }
        if let Some(name) = lookup("POSTER_NETWORK_CHAIN_NAME") {
            config.network.chain_name = name;
        }
        if let Some(urls) = lookup("POSTER_NETWORK_RPC_URLS") {
            config.network.rpc_urls = list(urls);
        }
        if let Some(urls) = lookup("POSTER_NETWORK_EXPLORER_URLS") {
            config.network.block_explorer_urls = list(urls);
        }

        if let Some(address) = var::<Address>(&lookup, "POSTER_CONTRACT_ADDRESS")? {
            config.contract.address = address;
        }

        if let Some(grace) = var::<humantime_serde::re::humantime::Duration>(&lookup, "POSTER_CLIENT_SWITCH_GRACE")? {
            config.client.switch_grace = grace.into();
        }
        if let Some(policy) = var::<TagPolicy>(&lookup, "POSTER_CLIENT_TAG_POLICY")? {
            config.client.tag_policy = policy;
        }
        if let Some(replay) = var::<bool>(&lookup, "POSTER_CLIENT_REPLAY_CONNECT_ON_RELOAD")? {
            config.client.replay_connect_on_reload = replay;
        }

        if let Some(price) = var::<u64>(&lookup, "POSTER_LEDGER_GAS_PRICE")? {
            config.ledger.gas_price = price;
        }
        if let Some(depth) = var::<u64>(&lookup, "POSTER_LEDGER_FINALITY_DEPTH")? {
            config.ledger.finality_depth = depth;
        }
        if let Some(path) = lookup("POSTER_LEDGER_JOURNAL_PATH") {
            config.ledger.journal_path = Some(PathBuf::from(path));
        }
        if let Some(funding) = var::<u64>(&lookup, "POSTER_LEDGER_DEV_FUNDING")? {
            config.ledger.dev_funding = funding;
        }

        if let Some(level) = var::<LogLevel>(&lookup, "POSTER_LOG_LEVEL")? {
            config.logging.level = level;
        }
        if let Some(format) = var::<LogFormat>(&lookup, "POSTER_LOG_FORMAT")? {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    /// Checks a wallet would also make when asked to register the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        let network = &self.network;
        ensure(network.chain_id > 0, || "chain_id must be greater than 0".to_string())?;
        ensure(!network.chain_name.trim().is_empty(), || "chain_name must not be empty".to_string())?;
        ensure(!network.rpc_urls.is_empty(), || "at least one rpc url is required".to_string())?;
        for url in network.rpc_urls.iter().chain(&network.block_explorer_urls) {
            ensure(url.starts_with("https://") || url.starts_with("http://"), || {
                format!("url must be http(s): {}", url)
            })?;
        }

        let currency = &network.native_currency;
        ensure(!currency.name.trim().is_empty(), || "native currency name must not be empty".to_string())?;
        ensure((2..=6).contains(&currency.symbol.chars().count()), || {
            format!("native currency symbol must be 2-6 characters: {}", currency.symbol)
        })?;
        ensure((1..=36).contains(&currency.decimals), || {
            format!("native currency decimals out of range: {}", currency.decimals)
        })?;

        ensure(self.contract.address != Address::ZERO, || "contract address must not be zero".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.chain_id_hex(), "0xaa36a7");
        assert_eq!(
            config.contract.address,
            "0xC1911439d81d4f7A1fE0eb17415E4f52606C09ac".parse().unwrap()
        );
        assert_eq!(config.client.switch_grace, Duration::from_secs(1));
        assert_eq!(config.client.tag_policy, TagPolicy::Exact);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.network.chain_id = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.network.rpc_urls = vec!["ws://node".to_string()];
        assert!(config.validate().is_err());

        config = Config::default();
        config.network.native_currency.symbol = "E".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.contract.address = Address::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_in_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poster.toml");
        std::fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));

        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("POSTER_NETWORK_CHAIN_ID", "0x539"),
            ("POSTER_NETWORK_RPC_URLS", "http://127.0.0.1:8545, http://localhost:8545"),
            ("POSTER_CLIENT_SWITCH_GRACE", "250ms"),
            ("POSTER_CLIENT_TAG_POLICY", "lowercase"),
            ("POSTER_LEDGER_FINALITY_DEPTH", "2"),
            ("POSTER_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.network.chain_id, 1337);
        assert_eq!(config.network.rpc_urls.len(), 2);
        assert_eq!(config.client.switch_grace, Duration::from_millis(250));
        assert_eq!(config.client.tag_policy, TagPolicy::Lowercase);
        assert_eq!(config.ledger.finality_depth, 2);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POSTER_CLIENT_SWITCH_GRACE", "soon")])),
            Err(ConfigError::InvalidValue { key: "POSTER_CLIENT_SWITCH_GRACE", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POSTER_CONTRACT_ADDRESS", "0x1234")])),
            Err(ConfigError::InvalidValue { key: "POSTER_CONTRACT_ADDRESS", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POSTER_LOG_LEVEL", "chatty")])),
            Err(ConfigError::InvalidValue { key: "POSTER_LOG_LEVEL", .. })
        ));
        assert!(matches!(
            Config::from_lookup(lookup_from(&[("POSTER_NETWORK_RPC_URLS", " , ")])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poster.toml");

        let mut config = Config::default();
        config.client.switch_grace = Duration::from_millis(1500);
        config.ledger.journal_path = Some(dir.path().join("journal.bin"));
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poster.toml");
        std::fs::write(&path, "[client]\ntag_policy = \"lowercase\"\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.client.tag_policy, TagPolicy::Lowercase);
        assert_eq!(loaded.network, NetworkDescriptor::default());
    }
}
