//! Signed post transactions.
//!
//! The sender is never a field the caller fills in: it is derived from the
//! verifying key that produced the signature, so a record's author is always
//! the key holder that authorized it.

use super::errors::{LedgerError, LedgerResult};
use crate::primitives::{keccak256, Address, ChainId, H256};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Flat cost of any transaction
pub const BASE_GAS: u64 = 21_000;
/// Cost of emitting one log entry with three topics
pub const LOG_GAS: u64 = 1_875;
/// Cost per byte of call data
pub const BYTE_GAS: u64 = 16;

/// Arguments of `post(content, tag)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCall {
    pub content: String,
    pub tag: String,
}

impl PostCall {
    pub fn new(content: impl Into<String>, tag: impl Into<String>) -> Self {
        Self { content: content.into(), tag: tag.into() }
    }

    /// Gas charged for executing this call
    pub fn gas(&self) -> u64 {
        let bytes = (self.content.len() + self.tag.len()) as u64;
        BASE_GAS + LOG_GAS + BYTE_GAS.saturating_mul(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain_id: ChainId,
    pub nonce: u64,
    pub to: Address,
    pub gas_price: u64,
    pub call: PostCall,
}

impl UnsignedTransaction {
    fn signing_bytes(&self) -> LedgerResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn sign(self, key: &SigningKey) -> LedgerResult<SignedTransaction> {
        let signature = key.sign(&self.signing_bytes()?);
        Ok(SignedTransaction {
            tx: self,
            public_key: key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn hash(&self) -> LedgerResult<H256> {
        Ok(keccak256(&bincode::serialize(self)?))
    }

    /// Verify the signature and return the address that produced it
    pub fn recover_sender(&self) -> LedgerResult<Address> {
        let key = VerifyingKey::from_bytes(&self.public_key)
            .map_err(|e| LedgerError::InvalidSignature(e.to_string()))?;
        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| LedgerError::InvalidSignature(e.to_string()))?;
        key.verify(&self.tx.signing_bytes()?, &signature)
            .map_err(|e| LedgerError::InvalidSignature(e.to_string()))?;
        Ok(Address::from_verifying_key(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsigned() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1337,
            nonce: 0,
            to: Address([9; 20]),
            gas_price: 1,
            call: PostCall::new("Hello, world!", "hello"),
        }
    }

    #[test]
    fn test_sign_and_recover() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let signed = unsigned().sign(&key).unwrap();
        let sender = signed.recover_sender().unwrap();
        assert_eq!(sender, Address::from_verifying_key(&key.verifying_key()));
    }

    #[test]
    fn test_tampered_call_fails_verification() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let mut signed = unsigned().sign(&key).unwrap();
        signed.tx.call.content = "Goodbye".to_string();
        assert!(matches!(signed.recover_sender(), Err(LedgerError::InvalidSignature(_))));
    }

    #[test]
    fn test_swapped_key_fails_verification() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let other = SigningKey::from_bytes(&[2u8; 32]);
        let mut signed = unsigned().sign(&key).unwrap();
        signed.public_key = other.verifying_key().to_bytes();
        assert!(signed.recover_sender().is_err());
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let key = SigningKey::from_bytes(&[1u8; 32]);
        let a = unsigned().sign(&key).unwrap();
        let mut tx = unsigned();
        tx.nonce = 1;
        let b = tx.sign(&key).unwrap();
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn test_gas_grows_with_payload() {
        let small = PostCall::new("a", "b");
        let large = PostCall::new("a".repeat(100), "b");
        assert_eq!(small.gas(), BASE_GAS + LOG_GAS + 2 * BYTE_GAS);
        assert!(large.gas() > small.gas());
    }
}
