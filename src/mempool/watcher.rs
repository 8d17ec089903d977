//! Mempool watcher: tracks block height via a WebSocket subscription,
//! polls unconfirmed txs over HTTP, decodes and caches them, and exposes
//! `iter_height_mempool` to per-route consumers.
//!
//! Grounded on `mempool/monitor.rs`'s reconnect-loop shape (bounded
//! reconnect count, exponential-free fixed backoff, `tokio::select!` between
//! the subscription stream and a polling interval) retargeted from an
//! Alchemy `alchemy_pendingTransactions` WS subscription to a Tendermint
//! `tm.event='NewBlockHeader'` one.

use super::cache::{mempool_contracted, MempoolCache, MAX_RAW_TX_LENGTH};
use super::decoder;
use super::types::DecodedTx;
use crate::error::ArbError;
use crate::filters::tx_filter::Filter;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tendermint_rpc::query::EventType;
use tendermint_rpc::{Client, HttpClient, SubscriptionClient, WebSocketClient};
use tokio::time::sleep;
use tracing::{error, info, warn};

const MAX_RECONNECTS: u32 = 50;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Shared current height, updated by the background WS subscription task and
/// read by the polling loop. `Arc`'d so a disconnect/reconnect of the WS
/// task doesn't require the poller to re-discover the height from scratch.
#[derive(Clone)]
pub struct HeightTracker(Arc<AtomicU64>);

impl HeightTracker {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, height: u64) {
        self.0.store(height, Ordering::Release);
    }
}

impl Default for HeightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribes to `NewBlockHeader` events and keeps `tracker` current.
/// Reconnects on stream failure up to `MAX_RECONNECTS` times, then gives up
/// (the caller's strategy loop treats that as fatal).
pub async fn run_height_tracker(ws_url: String, tracker: HeightTracker) -> Result<(), ArbError> {
    let mut reconnects = 0u32;

    loop {
        match height_tracker_session(&ws_url, &tracker).await {
            Ok(()) => {
                info!("height tracker: subscription ended cleanly");
                return Ok(());
            }
            Err(e) => {
                reconnects += 1;
                if reconnects > MAX_RECONNECTS {
                    error!(reconnects, "height tracker: reconnects exhausted, giving up");
                    return Err(e);
                }
                warn!(reconnects, error = %e, "height tracker: reconnecting in 5s");
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn height_tracker_session(ws_url: &str, tracker: &HeightTracker) -> Result<(), ArbError> {
    let (client, driver) =
        WebSocketClient::new(ws_url).await.map_err(|e| ArbError::Transport(e.to_string()))?;
    let driver_handle = tokio::spawn(driver.run());

    let mut subscription = client
        .subscribe(EventType::NewBlock.into())
        .await
        .map_err(|e| ArbError::Transport(e.to_string()))?;

    while let Some(event) = subscription.next().await {
        let event = event.map_err(|e| ArbError::Transport(e.to_string()))?;
        if let Some(height) = event.data.as_new_block_height() {
            tracker.set(height);
        }
    }

    client.close().map_err(|e| ArbError::Transport(e.to_string()))?;
    let _ = driver_handle.await;
    Err(ArbError::Transport("height subscription stream ended".to_string()))
}

/// Polls unconfirmed txs, maintains the decode cache, and yields matched
/// transactions per registered filter. One instance is owned by a single
/// strategy-driver task; there is no internal locking.
pub struct MempoolWatcher {
    http: HttpClient,
    chain_id: String,
    tracker: HeightTracker,
    cache: MempoolCache,
    last_height_seen: u64,
    last_keys: Vec<String>,
}

impl MempoolWatcher {
    pub fn new(lcd_rpc_url: &str, chain_id: impl Into<String>, tracker: HeightTracker) -> Result<Self, ArbError> {
        let http = HttpClient::new(lcd_rpc_url).map_err(|e| ArbError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            chain_id: chain_id.into(),
            tracker,
            cache: MempoolCache::new(),
            last_height_seen: 0,
            last_keys: Vec::new(),
        })
    }

    /// Fetches unconfirmed tx bytes over HTTP and folds any not-yet-seen
    /// entries into the cache, skipping anything over the gross-size
    /// ceiling and caching decode failures as null so they aren't retried.
    async fn poll_once(&mut self) -> Result<(), ArbError> {
        let response =
            self.http.unconfirmed_txs(None).await.map_err(|e| ArbError::Transport(e.to_string()))?;

        for tx in response.txs {
            let bytes: &[u8] = tx.as_ref();
            if bytes.len() > MAX_RAW_TX_LENGTH {
                continue;
            }
            let key = hex::encode(bytes);
            if self.cache.contains(&key) {
                continue;
            }
            let decoded = decoder::decode_raw_tx(bytes, &self.chain_id);
            self.cache.insert(key, decoded);
        }

        let height = self.tracker.get();
        let current_keys: Vec<String> = self.cache.keys().into_iter().map(str::to_string).collect();
        let previous: std::collections::HashSet<&str> = self.last_keys.iter().map(String::as_str).collect();
        let current: std::collections::HashSet<&str> = current_keys.iter().map(String::as_str).collect();

        let advanced = height > self.last_height_seen;
        let contracted = mempool_contracted(&previous, &current);

        if advanced || contracted {
            self.cache.clear();
        }
        self.last_height_seen = height;
        self.last_keys = current_keys;

        Ok(())
    }

    /// Blocks until either the height has advanced since the last yield, or
    /// at least one registered filter matches a tx this consumer hasn't seen
    /// yet, then returns the matches keyed by filter name. Mirrors the
    /// generator contract (§4.5): within one height, repeated calls never
    /// re-yield the same tx; once the height advances, the prior height's
    /// mempool is gone for good (the cache was cleared on the advance) but
    /// the advance itself is still surfaced so routes with a pending
    /// transition (broadcast, confirmation poll) keep making progress even
    /// when the mempool has gone quiet.
    pub async fn iter_height_mempool(
        &mut self,
        filters: &HashMap<String, Filter>,
    ) -> Result<(u64, HashMap<String, Vec<DecodedTx>>), ArbError> {
        let height_at_entry = self.last_height_seen;
        loop {
            self.poll_once().await?;

            let mut matches: HashMap<String, Vec<DecodedTx>> = HashMap::new();
            let unread_keys: Vec<String> =
                self.cache.keys().into_iter().filter(|k| self.cache.is_unread(k)).map(str::to_string).collect();

            for key in &unread_keys {
                let Some(Some(tx)) = self.cache.get(key).cloned() else {
                    self.cache.mark_read(key);
                    continue;
                };
                for (filter_key, filter) in filters {
                    if filter.matches(&tx) {
                        matches.entry(filter_key.clone()).or_default().push(tx.clone());
                    }
                }
                self.cache.mark_read(key);
            }

            if !matches.is_empty() || self.last_height_seen > height_at_entry {
                return Ok((self.last_height_seen, matches));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    pub fn current_height(&self) -> u64 {
        self.last_height_seen
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_tracker_round_trips() {
        let tracker = HeightTracker::new();
        assert_eq!(tracker.get(), 0);
        tracker.set(42);
        assert_eq!(tracker.get(), 42);
    }
}
