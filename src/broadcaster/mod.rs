//! Broadcaster coordination layer (§4.6): a replicated fleet where multiple
//! hosts share a duplicate-detection cache so the same opportunity is
//! broadcast at most once per block, with peer failover on height lag.

pub mod dedup;
pub mod fleet;

pub use dedup::{DedupCache, DedupOutcome};
pub use fleet::{BroadcasterFleet, HeightProbe, IpReflector};

use crate::error::ArbError;
use crate::pool::PoolKey;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// Wire shape of the fleet's own HTTP contract (§6: `POST /{chain}/txs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub height: u64,
    pub msgs: Vec<String>,
    pub n_repeat: u32,
    pub fee: Option<Decimal>,
    pub fee_denom: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastResult {
    Broadcasted,
    RepeatedTx,
    NewBlock,
}

/// The local chain-RPC broadcast call a peer falls through to once a
/// request clears duplicate detection. Transport itself is out of scope
/// (§1); this is the seam the HTTP handler drives.
#[async_trait]
pub trait LocalBroadcaster: Send + Sync {
    async fn broadcast(&self, request: &BroadcastRequest) -> Result<String, ArbError>;
}

/// Receiving side of the peer contract: applies `DedupCache`, then falls
/// through to the local LCD. One instance per chain this host serves.
pub struct BroadcasterPeerHandler {
    dedup: Mutex<DedupCache>,
    local: std::sync::Arc<dyn LocalBroadcaster>,
}

impl BroadcasterPeerHandler {
    pub fn new(initial_height: u64, local: std::sync::Arc<dyn LocalBroadcaster>) -> Self {
        Self { dedup: Mutex::new(DedupCache::new(initial_height)), local }
    }

    /// `touched_pools` is derived by the caller from `request.msgs` (via
    /// `CosmosMsg::touched_pools` on the decoded form) before this is
    /// called, since the wire `msgs` here are opaque descriptions.
    pub async fn handle(&self, request: BroadcastRequest, touched_pools: Vec<PoolKey>) -> Result<BroadcastResult, ArbError> {
        let outcome = {
            let mut dedup = self.dedup.lock().await;
            dedup.check_and_record(request.height, &touched_pools, &request.msgs)
        };
        match outcome {
            DedupOutcome::NewBlock => Ok(BroadcastResult::NewBlock),
            DedupOutcome::RepeatedTx => Ok(BroadcastResult::RepeatedTx),
            DedupOutcome::Accept => {
                let tx_hash = self.local.broadcast(&request).await?;
                info!(tx_hash = %tx_hash, height = request.height, "peer broadcast accepted");
                Ok(BroadcastResult::Broadcasted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysBroadcasts;

    #[async_trait]
    impl LocalBroadcaster for AlwaysBroadcasts {
        async fn broadcast(&self, _request: &BroadcastRequest) -> Result<String, ArbError> {
            Ok("DEADBEEF".to_string())
        }
    }

    fn pool(id: &str) -> PoolKey {
        PoolKey::new("columbus-5", id)
    }

    #[tokio::test]
    async fn novel_request_broadcasts_then_repeats() {
        let handler = BroadcasterPeerHandler::new(100, std::sync::Arc::new(AlwaysBroadcasts));
        let req = BroadcastRequest {
            height: 100,
            msgs: vec!["swap UST->LUNA amount=5000".to_string()],
            n_repeat: 1,
            fee: None,
            fee_denom: None,
        };
        let first = handler.handle(req.clone(), vec![pool("p1")]).await.unwrap();
        assert_eq!(first, BroadcastResult::Broadcasted);

        let second = handler.handle(req, vec![pool("p1")]).await.unwrap();
        assert_eq!(second, BroadcastResult::RepeatedTx);
    }

    #[tokio::test]
    async fn stale_height_reports_new_block() {
        let handler = BroadcasterPeerHandler::new(100, std::sync::Arc::new(AlwaysBroadcasts));
        let req = BroadcastRequest { height: 99, msgs: vec![], n_repeat: 1, fee: None, fee_denom: None };
        let result = handler.handle(req, vec![]).await.unwrap();
        assert_eq!(result, BroadcastResult::NewBlock);
    }
}
