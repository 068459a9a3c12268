//! Test utilities and helpers for Poster
//!
//! Fixtures that wire development ledgers, a development wallet and the
//! client together, shared by unit tests, integration tests and benches.

pub mod fixtures;

pub use fixtures::*;
