//! Mempool watcher: decode+dedup cache keyed by raw tx string, block-height
//! tracking, and the `iter_height_mempool` stream consumed by the strategy
//! driver's per-route dispatch.

pub mod cache;
pub mod decoder;
pub mod types;
pub mod watcher;

pub use cache::MempoolCache;
pub use types::{CosmosMsg, DecodedTx};
pub use watcher::{HeightTracker, MempoolWatcher};
