//! Broadcaster peer election (§4.6): health-probes configured peers by
//! height proximity, sticks with the active peer until it falls behind,
//! and filters out peers that resolve to this host's own public IP.
//!
//! Grounded on `original_source/src/chains/cosmos/client/broadcaster_client.py`
//! (`_MAX_BROADCASTER_HEIGHT_DIFFERENCE`, the sticky-active-peer probe loop,
//! and the startup IP-reflector self-filter).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A peer is considered healthy if its reported height is within this many
/// blocks of ours.
const MAX_BROADCASTER_HEIGHT_DIFFERENCE: u64 = 2;

/// Queries a broadcaster peer's reported chain height (`GET /lcd/blocks/latest`
/// in §6's proxy contract).
#[async_trait]
pub trait HeightProbe: Send + Sync {
    async fn probe_height(&self, peer_base_url: &str) -> Option<u64>;
}

/// One public IP-reflector service consulted at startup.
#[async_trait]
pub trait IpReflector: Send + Sync {
    async fn reflect(&self) -> Option<String>;
}

/// Elects and tracks the active broadcaster peer. `None` active peer means
/// "use the local LCD directly" (§4.6: "falls back to using its own LCD").
pub struct BroadcasterFleet {
    peers: Vec<String>,
    active_peer: RwLock<Option<String>>,
    probe: Arc<dyn HeightProbe>,
}

impl BroadcasterFleet {
    /// Resolves this host's own public IP via majority vote across
    /// `reflectors`, strips any configured peer whose URL contains that IP,
    /// and returns a fleet ready for `elect`.
    pub async fn new(configured_peers: Vec<String>, reflectors: &[Arc<dyn IpReflector>], probe: Arc<dyn HeightProbe>) -> Self {
        let self_ip = majority_vote_ip(reflectors).await;
        let peers = match &self_ip {
            Some(ip) => {
                let (kept, dropped): (Vec<_>, Vec<_>) = configured_peers.into_iter().partition(|p| !p.contains(ip.as_str()));
                for d in &dropped {
                    info!(peer = %d, self_ip = %ip, "dropping broadcaster peer pointing at this host");
                }
                kept
            }
            None => configured_peers,
        };
        Self { peers, active_peer: RwLock::new(None), probe }
    }

    #[cfg(test)]
    fn with_peers(peers: Vec<String>, probe: Arc<dyn HeightProbe>) -> Self {
        Self { peers, active_peer: RwLock::new(None), probe }
    }

    /// Re-elects the active peer: keeps the current one if it is still
    /// within tolerance, otherwise probes the configured list in order and
    /// adopts the first healthy one. Falls back to `None` (local LCD) if
    /// nothing is healthy.
    pub async fn elect(&self, our_height: u64) {
        if let Some(active) = self.active_peer.read().await.clone() {
            if let Some(peer_height) = self.probe.probe_height(&active).await {
                if height_is_ok(peer_height, our_height) {
                    return;
                }
            }
            warn!(peer = %active, "active broadcaster peer fell behind, re-electing");
        }

        for peer in &self.peers {
            if let Some(peer_height) = self.probe.probe_height(peer).await {
                if height_is_ok(peer_height, our_height) {
                    *self.active_peer.write().await = Some(peer.clone());
                    return;
                }
            }
        }

        info!("no broadcaster peer within height tolerance, falling back to local LCD");
        *self.active_peer.write().await = None;
    }

    pub async fn active_peer(&self) -> Option<String> {
        self.active_peer.read().await.clone()
    }

    pub fn configured_peers(&self) -> &[String] {
        &self.peers
    }
}

fn height_is_ok(peer_height: u64, our_height: u64) -> bool {
    peer_height.abs_diff(our_height) <= MAX_BROADCASTER_HEIGHT_DIFFERENCE
}

async fn majority_vote_ip(reflectors: &[Arc<dyn IpReflector>]) -> Option<String> {
    let mut votes: HashMap<String, u32> = HashMap::new();
    for reflector in reflectors {
        if let Some(ip) = reflector.reflect().await {
            *votes.entry(ip).or_insert(0) += 1;
        }
    }
    votes.into_iter().max_by_key(|(_, count)| *count).map(|(ip, _)| ip)
}
