//! Process-wide counters exposed as an external metrics surface.
//!
//! The exact counter set is an implementation detail per the error
//! handling design; this mirrors the original crawler's `Stats` struct.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub dht_packets_in: AtomicU64,
    pub dht_packets_out: AtomicU64,
    pub dht_packets_dropped: AtomicU64,
    pub dht_errors: AtomicU64,
    pub dht_bytes_in: AtomicU64,
    pub dht_bytes_out: AtomicU64,
    pub dht_workers: AtomicU64,
    pub bt_bytes_in: AtomicU64,
    pub bt_bytes_out: AtomicU64,
    pub bt_workers: AtomicU64,
    pub peers_announced: AtomicU64,
    pub peers_skipped: AtomicU64,
    pub torrents_saved: AtomicU64,
    pub torrents_skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub dht_packets_in: u64,
    pub dht_packets_out: u64,
    pub dht_packets_dropped: u64,
    pub dht_errors: u64,
    pub dht_bytes_in: u64,
    pub dht_bytes_out: u64,
    pub dht_workers: u64,
    pub bt_bytes_in: u64,
    pub bt_bytes_out: u64,
    pub bt_workers: u64,
    pub peers_announced: u64,
    pub peers_skipped: u64,
    pub torrents_saved: u64,
    pub torrents_skipped: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            dht_packets_in: self.dht_packets_in.load(Ordering::Relaxed),
            dht_packets_out: self.dht_packets_out.load(Ordering::Relaxed),
            dht_packets_dropped: self.dht_packets_dropped.load(Ordering::Relaxed),
            dht_errors: self.dht_errors.load(Ordering::Relaxed),
            dht_bytes_in: self.dht_bytes_in.load(Ordering::Relaxed),
            dht_bytes_out: self.dht_bytes_out.load(Ordering::Relaxed),
            dht_workers: self.dht_workers.load(Ordering::Relaxed),
            bt_bytes_in: self.bt_bytes_in.load(Ordering::Relaxed),
            bt_bytes_out: self.bt_bytes_out.load(Ordering::Relaxed),
            bt_workers: self.bt_workers.load(Ordering::Relaxed),
            peers_announced: self.peers_announced.load(Ordering::Relaxed),
            peers_skipped: self.peers_skipped.load(Ordering::Relaxed),
            torrents_saved: self.torrents_saved.load(Ordering::Relaxed),
            torrents_skipped: self.torrents_skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = Stats::new();
        Stats::incr(&stats.dht_packets_in, 3);
        Stats::incr(&stats.peers_announced, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.dht_packets_in, 3);
        assert_eq!(snap.peers_announced, 1);
        assert_eq!(snap.dht_packets_out, 0);
    }
}
