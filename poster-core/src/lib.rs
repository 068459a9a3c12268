//! Poster core
//!
//! Tagged text posts stored as `NewPost` log entries on an append-only ledger,
//! and the client that connects a wallet, submits posts and rebuilds the feed
//! by replaying the log.
//!
//! Layering, leaves first:
//!
//! - [`ledger`]: the record store (plus an in-process development chain)
//! - [`query`]: range scans over the `NewPost` log history
//! - [`tag`]: Keccak-256 tag hashing and the case policy applied around it
//! - [`feed`]: raw log entries into newest-first post views
//! - [`wallet`]: the connection/network state machine and wallet providers
//! - [`client`]: the pieces wired together behind one handle

pub mod client;
pub mod config;
pub mod feed;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod primitives;
pub mod query;
pub mod tag;
pub mod test_utils;
pub mod wallet;

pub use logging::{init_logging, LogLevel};
pub use primitives::{keccak256, Address, BlockNumber, ChainId, H256};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        let _ = Address::ZERO;
        assert_eq!(keccak256(b"").to_string().len(), 66);
    }
}
