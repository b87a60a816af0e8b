//! Per-remote-host connection statistics.
//!
//! An observation sink, not a decision-maker: the relay records connection
//! counts and plaintext byte totals here, and the shutdown path reads them
//! back. Counter updates are lock-free atomic increments on shared handles;
//! the registry mutex is only touched when a connection is first accepted.
//!
//! The registry grows with the set of distinct remote hosts seen and is
//! never evicted. That is a deliberate, known operational tradeoff carried
//! over from the design this follows; see DESIGN.md.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

/// Counters for one remote host. Updated concurrently by both directions of
/// every connection from that host.
#[derive(Debug, Default)]
pub struct HostCounters {
    connections: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
}

impl HostCounters {
    /// Adds plaintext bytes read from the remote host.
    pub fn add_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Adds plaintext bytes written to the remote host.
    pub fn add_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// One row of a statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub remote: String,
    pub connections: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Registry of per-remote-host counters, keyed by remote host string.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    hosts: Mutex<HashMap<String, Arc<HostCounters>>>,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted connection and returns the counter handle the
    /// relay increments for its lifetime. The entry is created lazily on
    /// the first connection from a remote host.
    pub fn record_connection(&self, remote_host: &str) -> Arc<HostCounters> {
        let mut hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let counters = hosts
            .entry(remote_host.to_string())
            .or_default()
            .clone();
        counters.connections.fetch_add(1, Ordering::Relaxed);
        counters
    }

    /// The counter handle for a remote host, if one has connected.
    pub fn get(&self, remote_host: &str) -> Option<Arc<HostCounters>> {
        self.hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(remote_host)
            .cloned()
    }

    /// A point-in-time copy of every host's totals, sorted by host.
    pub fn snapshot(&self) -> Vec<HostReport> {
        let hosts = self
            .hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut rows: Vec<HostReport> = hosts
            .iter()
            .map(|(remote, counters)| HostReport {
                remote: remote.clone(),
                connections: counters.connections(),
                bytes_received: counters.bytes_received(),
                bytes_sent: counters.bytes_sent(),
            })
            .collect();
        rows.sort_by(|a, b| a.remote.cmp(&b.remote));
        rows
    }

    /// Emits the shutdown report: one line per remote host plus totals.
    pub fn report(&self) {
        let rows = self.snapshot();
        let mut connections = 0u64;
        let mut received = 0u64;
        let mut sent = 0u64;
        for row in &rows {
            info!(
                remote = %row.remote,
                connections = row.connections,
                bytes_received = row.bytes_received,
                bytes_sent = row.bytes_sent,
                "connection totals"
            );
            connections += row.connections;
            received += row.bytes_received;
            sent += row.bytes_sent;
        }
        info!(
            remotes = rows.len(),
            connections,
            bytes_received = received,
            bytes_sent = sent,
            "aggregate totals"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_created_lazily_and_reused() {
        let stats = ConnectionStats::new();
        assert!(stats.get("192.0.2.1").is_none());

        let first = stats.record_connection("192.0.2.1");
        let second = stats.record_connection("192.0.2.1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.connections(), 2);
    }

    #[test]
    fn byte_totals_accumulate_per_host() {
        let stats = ConnectionStats::new();
        let counters = stats.record_connection("192.0.2.1");
        counters.add_received(10);
        counters.add_received(5);
        counters.add_sent(7);

        let handle = stats.get("192.0.2.1").unwrap();
        assert_eq!(handle.bytes_received(), 15);
        assert_eq!(handle.bytes_sent(), 7);
    }

    #[test]
    fn hosts_do_not_cross_update() {
        let stats = ConnectionStats::new();
        let a = stats.record_connection("192.0.2.1");
        let b = stats.record_connection("198.51.100.2");
        a.add_received(100);
        b.add_sent(50);

        let rows = stats.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].remote, "192.0.2.1");
        assert_eq!(rows[0].bytes_received, 100);
        assert_eq!(rows[0].bytes_sent, 0);
        assert_eq!(rows[1].remote, "198.51.100.2");
        assert_eq!(rows[1].bytes_received, 0);
        assert_eq!(rows[1].bytes_sent, 50);
    }

    #[test]
    fn concurrent_increments_do_not_lose_updates() {
        let stats = Arc::new(ConnectionStats::new());
        let counters = stats.record_connection("192.0.2.1");
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.add_received(1);
                        counters.add_sent(2);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(counters.bytes_received(), 8_000);
        assert_eq!(counters.bytes_sent(), 16_000);
    }
}
