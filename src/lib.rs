//! Cosmos-SDK on-chain arbitrage execution engine.
//!
//! Scans Terra/Osmosis mempools and blocks for profitable cyclic swaps
//! across constant-product, native-market, and weighted-pool AMMs, sizes
//! each opportunity with a convex optimizer, and drives repeated
//! broadcasts through a replicated broadcaster fleet.

pub mod arbitrage;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod fee;
pub mod filters;
pub mod mempool;
pub mod optimizer;
pub mod pool;
pub mod route;
pub mod strategy;
pub mod token;
pub mod types;

pub use arbitrage::{RouteEngine, RouteEngineConfig};
pub use config::{load_config, CliArgs};
pub use error::ArbError;
pub use strategy::StrategyDriver;
pub use types::BotConfig;
