//! In-memory table of the latest report from every reporting node.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use libp2p::PeerId;
use pulse_protocol::Heartbeat;

/// Last known status of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub peer:      PeerId,
    pub nickname:  String,
    pub head:      String,
    pub height:    u64,
    /// Beats received from this peer since the aggregator started.
    pub beats:     u64,
    /// Unix seconds of the most recent beat.
    pub last_seen: u64,
}

#[derive(Clone, Default)]
pub struct BeatStore {
    inner: Arc<RwLock<HashMap<PeerId, NodeStatus>>>,
}

impl BeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, peer: PeerId, hb: Heartbeat) {
        let now = now_secs();
        let mut inner = self.inner.write().unwrap();
        let status = inner.entry(peer).or_insert_with(|| NodeStatus {
            peer,
            nickname:  String::new(),
            head:      String::new(),
            height:    0,
            beats:     0,
            last_seen: now,
        });
        status.nickname  = hb.nickname;
        status.head      = hb.head;
        status.height    = hb.height;
        status.beats    += 1;
        status.last_seen = now;
    }

    #[cfg(test)]
    pub fn get(&self, peer: &PeerId) -> Option<NodeStatus> {
        self.inner.read().unwrap().get(peer).cloned()
    }

    /// All nodes, ordered by nickname then peer id.
    pub fn snapshot(&self) -> Vec<NodeStatus> {
        let mut nodes: Vec<NodeStatus> = self.inner.read().unwrap().values().cloned().collect();
        nodes.sort_by(|a, b| {
            a.nickname
                .cmp(&b.nickname)
                .then_with(|| a.peer.to_base58().cmp(&b.peer.to_base58()))
        });
        nodes
    }

    /// Nodes whose last beat is older than `max_age_secs`.
    pub fn stale(&self, max_age_secs: u64) -> Vec<NodeStatus> {
        let now = now_secs();
        self.snapshot()
            .into_iter()
            .filter(|n| now.saturating_sub(n.last_seen) > max_age_secs)
            .collect()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
