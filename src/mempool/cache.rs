//! Decode+dedup cache keyed by raw tx string, shared between the watcher's
//! background poller and `iter_height_mempool`'s consumer-facing generator.

use super::types::{CacheEntry, DecodedTx};
use std::collections::{HashMap, HashSet};

/// Raw tx strings longer than this are a gross-size ceiling on what's worth
/// decoding — a legitimate swap never needs this many bytes, and large blobs
/// are disproportionately expensive to decode for no payoff.
pub const MAX_RAW_TX_LENGTH: usize = 3000;

/// `{raw_tx_string -> decoded_tx_or_null}`, cleared wholesale on block
/// advance or whenever the mempool contracts (a cheap proxy for "a block
/// just landed" that doesn't require waiting for the height subscription).
#[derive(Default)]
pub struct MempoolCache {
    entries: HashMap<String, CacheEntry>,
    /// Keys already handed to `iter_height_mempool`'s caller at the current
    /// height, so a slow consumer never receives the same tx twice within
    /// one height.
    already_read: HashSet<String>,
}

impl MempoolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a decode result for `raw`, keyed by the raw string itself.
    /// Decode failures (`None`) are cached too, so the watcher doesn't retry
    /// decoding the same bytes on the next poll.
    pub fn insert(&mut self, raw: String, decoded: CacheEntry) {
        self.entries.insert(raw, decoded);
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.entries.contains_key(raw)
    }

    pub fn get(&self, raw: &str) -> Option<&CacheEntry> {
        self.entries.get(raw)
    }

    /// All currently decoded (non-null) txs, for filter evaluation.
    pub fn decoded_txs(&self) -> impl Iterator<Item = &DecodedTx> {
        self.entries.values().filter_map(|e| e.as_ref())
    }

    /// Keys present in the cache right now — used by the watcher to detect a
    /// contracting mempool (`new_keys` not a superset of the previous poll's
    /// keys implies a block landed and some txs were confirmed out of it).
    pub fn keys(&self) -> HashSet<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn mark_read(&mut self, raw: &str) {
        self.already_read.insert(raw.to_string());
    }

    pub fn is_unread(&self, raw: &str) -> bool {
        !self.already_read.contains(raw)
    }

    /// Clears both the decode cache and the read-tracking set. Called on
    /// block advance or mempool contraction — a contracting mempool implies
    /// a block landed, so every entry is about to go stale anyway.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.already_read.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True when `previous` is not a subset of `current` — some tx that was
/// pending a moment ago is no longer in the mempool, the cheapest signal
/// that a block has just landed without waiting on the height subscription.
pub fn mempool_contracted(previous: &HashSet<&str>, current: &HashSet<&str>) -> bool {
    !previous.is_subset(current)
}
