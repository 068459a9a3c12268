//! Metrics for observability
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! embedding binary installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Ledger
    describe_counter!("ledger.posts.appended", "Post records appended to the ledger");
    describe_counter!("ledger.tx.rejected", "Transactions rejected by the ledger");

    // Query
    describe_counter!("query.logs.scanned", "Log entries returned by range queries");
    describe_histogram!("query.duration_ms", "Log range query duration in milliseconds");

    // Client
    describe_counter!("client.posts.submitted", "Posts accepted after submission by the client");
    describe_counter!("client.posts.failed", "Post submissions refused or rejected");

    // Wallet
    describe_counter!("wallet.transitions", "Connection state machine transitions");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Measures an operation and records it in milliseconds when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer, record the duration and return it in milliseconds
    pub fn stop(self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        record_histogram(self.name, elapsed);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        init_metrics();
        record_counter("client.posts.submitted", 1);
        record_histogram("query.duration_ms", 2.5);
    }

    #[test]
    fn test_timer_measures() {
        let timer = Timer::new("query.duration_ms");
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.stop() >= 1.0);
    }
}
