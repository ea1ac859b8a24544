use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use sentinel_core::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerInfo {
    pub last_seen: Instant,
    pub active: bool,
}

/// Liveness table shared by the inbound loop and the heartbeat ticker.
#[derive(Debug)]
pub struct PeerTable {
    peers: RwLock<HashMap<Address, PeerInfo>>,
    inactive_after: Duration,
    evict_after: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub marked_inactive: usize,
    pub evicted: usize,
}

impl PeerTable {
    pub fn new(inactive_after: Duration, evict_after: Duration) -> Self {
        PeerTable {
            peers: RwLock::new(HashMap::new()),
            inactive_after,
            evict_after,
        }
    }

    pub fn touch(&self, peer: Address, now: Instant) {
        let mut peers = self.peers.write();
        let info = peers.entry(peer).or_insert(PeerInfo {
            last_seen: now,
            active: true,
        });
        info.last_seen = now;
        info.active = true;
    }

    /// Mark idle peers inactive and drop the ones idle past the eviction
    /// threshold.
    pub fn cleanup(&self, now: Instant) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut peers = self.peers.write();

        peers.retain(|id, info| {
            let idle = now.saturating_duration_since(info.last_seen);
            if idle >= self.evict_after {
                debug!(peer = %id, idle_secs = idle.as_secs(), "evicting stale peer");
                report.evicted += 1;
                return false;
            }
            if idle >= self.inactive_after && info.active {
                info.active = false;
                report.marked_inactive += 1;
            }
            true
        });
        report
    }

    pub fn get(&self, peer: &Address) -> Option<PeerInfo> {
        self.peers.read().get(peer).copied()
    }

    pub fn active_count(&self) -> usize {
        self.peers.read().values().filter(|p| p.active).count()
    }

    pub fn tracked_count(&self) -> usize {
        self.peers.read().len()
    }
}
