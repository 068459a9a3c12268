//! Fixed-width ledger primitives: addresses, 32-byte words and chain ids.
//!
//! Both `Address` and `H256` render as `0x`-prefixed lowercase hex and parse
//! hex in any case, with or without the prefix. They serialize as strings so
//! they read naturally in TOML configuration.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of a ledger network (EIP-155 chain id)
pub type ChainId = u64;

/// Height of a block in the ledger
pub type BlockNumber = u64;

/// Errors produced when parsing hex-encoded primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Keccak-256 digest of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    H256(out)
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], HexError> {
    let bytes = hex::decode(strip_hex_prefix(s.trim()))
        .map_err(|e| HexError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(HexError::InvalidLength { expected: N, actual: bytes.len() });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// A 32-byte word: hashes, topics, transaction and block ids
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct H256(pub [u8; 32]);

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Big-endian word holding `value` in its low bytes
    pub fn from_u64(value: u64) -> Self {
        let mut out = [0u8; 32];
        out[24..].copy_from_slice(&value.to_be_bytes());
        H256(out)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self)
    }
}

impl FromStr for H256 {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(H256)
    }
}

/// A 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Address owned by an ed25519 verifying key: the last 20 bytes of the
    /// Keccak-256 of the key bytes
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let digest = keccak256(key.as_bytes());
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.0[12..]);
        Address(out)
    }

    /// Left-pad the address into an indexed topic word
    pub fn to_topic(&self) -> H256 {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        H256(out)
    }

    /// Recover an address from an indexed topic word.
    ///
    /// Returns `None` when the 12 padding bytes are not zero.
    pub fn from_topic(topic: &H256) -> Option<Self> {
        if topic.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&topic.0[12..]);
        Some(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(Address)
    }
}

macro_rules! impl_hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_hex_serde!(H256);
impl_hex_serde!(Address);

/// Render a chain id the way wallets report it (`0xaa36a7`)
pub fn format_chain_id(chain_id: ChainId) -> String {
    format!("0x{:x}", chain_id)
}

/// Parse a chain id given either as `0x`-prefixed hex or as decimal
pub fn parse_chain_id(s: &str) -> Result<ChainId, HexError> {
    let s = s.trim();
    let parsed = if s.starts_with("0x") || s.starts_with("0X") {
        u64::from_str_radix(strip_hex_prefix(s), 16)
    } else {
        s.parse::<u64>()
    };
    parsed.map_err(|e| HexError::InvalidHex(format!("{}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_known_vectors() {
        assert_eq!(
            keccak256(b"").to_string(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            keccak256(b"hello").to_string(),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_h256_parse_is_case_insensitive() {
        let lower: H256 = "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
            .parse()
            .unwrap();
        let upper: H256 = "0X1C8AFF950685C2ED4BC3174F3472287B56D9517B9C948127319A09A7A36DEAC8"
            .parse()
            .unwrap();
        let bare: H256 = "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
            .parse()
            .unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, bare);
    }

    #[test]
    fn test_h256_rejects_wrong_length() {
        let err = "0x1234".parse::<H256>().unwrap_err();
        assert_eq!(err, HexError::InvalidLength { expected: 32, actual: 2 });
        assert!("0xzz".parse::<H256>().is_err());
    }

    #[test]
    fn test_address_display_roundtrip() {
        let addr: Address = "0xC1911439d81d4f7A1fE0eb17415E4f52606C09ac".parse().unwrap();
        assert_eq!(addr.to_string(), "0xc1911439d81d4f7a1fe0eb17415e4f52606c09ac");
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_topic_padding() {
        let addr = Address([0xab; 20]);
        let topic = addr.to_topic();
        assert!(topic.0[..12].iter().all(|b| *b == 0));
        assert_eq!(Address::from_topic(&topic), Some(addr));

        let mut dirty = topic;
        dirty.0[0] = 1;
        assert_eq!(Address::from_topic(&dirty), None);
    }

    #[test]
    fn test_address_from_verifying_key_is_stable() {
        let key = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let a = Address::from_verifying_key(&key.verifying_key());
        let b = Address::from_verifying_key(&key.verifying_key());
        assert_eq!(a, b);
        assert_ne!(a, Address::ZERO);
    }

    #[test]
    fn test_chain_id_formatting() {
        assert_eq!(format_chain_id(11_155_111), "0xaa36a7");
        assert_eq!(parse_chain_id("0xaa36a7").unwrap(), 11_155_111);
        assert_eq!(parse_chain_id("0XAA36A7").unwrap(), 11_155_111);
        assert_eq!(parse_chain_id("1337").unwrap(), 1337);
        assert!(parse_chain_id("sepolia").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            address: Address,
        }
        let w = Wrapper { address: Address([1; 20]) };
        let toml = toml::to_string(&w).unwrap();
        assert!(toml.contains("0x0101"));
        let back: Wrapper = toml::from_str(&toml).unwrap();
        assert_eq!(back.address, w.address);
    }
}
