//! Lock engine statistics
//!
//! Counters for observability only; the protocol never reads them back.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters updated by the engine as it runs
#[derive(Debug, Default)]
pub struct LockStatsCollector {
    acquires: AtomicU64,
    releases: AtomicU64,
    forwards: AtomicU64,
    forced_transfers: AtomicU64,
    pruned_peers: AtomicU64,
    acquire_timeouts: AtomicU64,
    pending_acquires: AtomicU64,
}

impl LockStatsCollector {
    pub fn record_acquire(&self) {
        self.acquires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forward(&self) {
        self.forwards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced_transfer(&self) {
        self.forced_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pruned_peer(&self) {
        self.pruned_peers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquire_timeout(&self) {
        self.acquire_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_inc(&self) {
        self.pending_acquires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_dec(&self) {
        let _ = self
            .pending_acquires
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                v.checked_sub(1)
            });
    }

    pub fn snapshot(&self) -> LockStats {
        LockStats {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            forwards: self.forwards.load(Ordering::Relaxed),
            forced_transfers: self.forced_transfers.load(Ordering::Relaxed),
            pruned_peers: self.pruned_peers.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            pending_acquires: self.pending_acquires.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the collector
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub acquires: u64,
    pub releases: u64,
    pub forwards: u64,
    pub forced_transfers: u64,
    pub pruned_peers: u64,
    pub acquire_timeouts: u64,
    /// Acquire calls currently blocked waiting for the token
    pub pending_acquires: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = LockStatsCollector::default();
        stats.record_acquire();
        stats.record_acquire();
        stats.record_release();
        stats.record_forward();
        stats.record_pruned_peer();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.acquires, 2);
        assert_eq!(snapshot.releases, 1);
        assert_eq!(snapshot.forwards, 1);
        assert_eq!(snapshot.pruned_peers, 1);
        assert_eq!(snapshot.forced_transfers, 0);
    }

    #[test]
    fn test_pending_gauge_never_underflows() {
        let stats = LockStatsCollector::default();
        stats.pending_dec();
        assert_eq!(stats.snapshot().pending_acquires, 0);
        stats.pending_inc();
        stats.pending_inc();
        stats.pending_dec();
        assert_eq!(stats.snapshot().pending_acquires, 1);
    }
}
