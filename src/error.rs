//! Error taxonomy for the arbitrage engine.
//!
//! Every domain failure the engine can produce is one variant here; call
//! boundaries that touch genuinely unexpected failures (malformed config,
//! panics inside spawned tasks) still use `anyhow::Error`, matching the
//! split already present in the rest of the workspace.

use thiserror::Error;

/// Domain error kinds produced by pool math, the mempool watcher, the
/// broadcaster fleet, and the arbitrage engine's state machine.
///
/// Each variant's retry/reset/abort policy is documented alongside it;
/// the policy itself lives in the callers (`arbitrage::engine`,
/// `fee`), not in this enum.
#[derive(Debug, Error, Clone)]
pub enum ArbError {
    /// Node is behind the network on startup. Policy: sleep 60s, restart strategy.
    #[error("node is syncing, behind network head")]
    NodeSyncing,

    /// Parameters were computed for a height that is no longer current.
    /// Policy: reset route data, stay in ReadyToPlan.
    #[error("blockchain advanced past planned height {planned}, now at {current}")]
    BlockchainNewState { planned: u64, current: u64 },

    /// A duplicate broadcast intent was detected, locally or by a peer.
    /// Policy: reset route.
    #[error("transaction already broadcasted for this route")]
    TxAlreadyBroadcasted,

    /// Confirmation is not yet available. Policy: leave state, retry next block.
    #[error("result not yet available, still busy")]
    IsBusy,

    /// Pool reserves are zero at construction time, or a swap would underflow them.
    /// Policy: skip route / abort pool init.
    #[error("insufficient liquidity in pool {pool_id}")]
    InsufficientLiquidity { pool_id: String },

    /// A simulated or planned swap would violate its own belief price / max spread.
    /// Policy: skip that transaction during simulation.
    #[error("swap would exceed max spread: expected {expected}, realized {realized}")]
    MaxSpreadAssertion { expected: String, realized: String },

    /// Gas simulation failed and no fallback estimate was permitted.
    /// Policy: abort this planning cycle.
    #[error("fee estimation failed: {reason}")]
    FeeEstimationError { reason: String },

    /// Newton's method produced a negative iterate and bisection also
    /// rejected the search region. Policy: abort this planning cycle.
    #[error("optimizer could not find a maximum: {reason}")]
    OptimizationError { reason: String },

    /// Best-case net profit is below the configured threshold.
    /// Policy: debug-log and wait.
    #[error("best route nets {net_profit}, below minimum {min_profit}")]
    UnprofitableArbitrage { net_profit: String, min_profit: String },

    /// Address book points at something that is not a contract.
    /// Policy: skip, this is a misconfiguration.
    #[error("address {address} is not a contract")]
    NotContract { address: String },

    /// Operating on amounts of two different tokens.
    #[error("mismatched tokens: {a} and {b}")]
    MismatchedTokens { a: String, b: String },

    /// RPC/LCD/gRPC transport failure, not otherwise classified above.
    #[error("transport error: {0}")]
    Transport(String),

    /// Decoding a raw transaction or an on-chain message failed.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ArbError {
    /// True for kinds whose underlying operation is safe to retry (queries,
    /// fee simulation). Broadcast is never retried through this mechanism —
    /// duplicate detection there is the broadcaster fleet's job instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ArbError::IsBusy | ArbError::NodeSyncing | ArbError::Transport(_)
        )
    }
}
