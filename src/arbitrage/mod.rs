//! Arbitrage engine: per-route lifecycle state machine (§4.8), driven by the
//! strategy layer over a mempool-derived reserve-simulation overlay.

pub mod engine;
pub mod reserve_sim;
pub mod state;

pub use engine::{RouteEngine, RouteEngineConfig, TxInfoClient, TxInfoQuery};
pub use state::{derive_state, EngineState};
