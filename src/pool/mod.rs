//! Pool models: constant-product (Terraswap/Loop/Astroport), native-market
//! (Terra's synthetic LUNA/stablecoin pool) and weighted (Osmosis GAMM)
//! AMMs, plus the singleton registry that caches pool instances by identity.

pub mod constant_product;
pub mod native;
pub mod registry;
pub mod weighted;

pub use constant_product::ConstantProductPool;
pub use native::NativePool;
pub use registry::PoolRegistry;
pub use weighted::WeightedPool;

use crate::error::ArbError;
use crate::mempool::types::DecodedTx;
use crate::token::{Token, TokenAmount};
use serde::{Deserialize, Serialize};

/// Identifies a pool instance across chains: the chain it lives on, plus
/// either its contract address (CosmWasm pools) or numeric pool id
/// (Osmosis GAMM, Terra's market module uses a fixed sentinel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    pub chain_id: String,
    pub pool_id: String,
}

impl PoolKey {
    pub fn new(chain_id: impl Into<String>, pool_id: impl Into<String>) -> Self {
        Self { chain_id: chain_id.into(), pool_id: pool_id.into() }
    }
}

/// A built swap message sequence plus its quoted output, ready to sign.
/// Mirrors `build_swap_ops`/`build_ops` from the route layer: most pools
/// emit one message, routers collapse a whole hop sequence into one.
#[derive(Debug, Clone)]
pub struct SwapOps {
    pub amount_out_estimate: TokenAmount,
    pub messages: Vec<PoolMsg>,
}

/// A pool-originated outbound message, kept abstract here since signing and
/// wire encoding are out of scope — the broadcaster and fee modules only
/// need its pool identity and a human-readable description for logging.
#[derive(Debug, Clone)]
pub struct PoolMsg {
    pub pool: PoolKey,
    pub description: String,
}

/// Operations every pool variant exposes, dispatched through the `Pool`
/// enum rather than `dyn Trait` since the variant set (constant-product,
/// native-market, weighted) is closed — see DESIGN.md.
pub trait PoolOps {
    fn key(&self) -> &PoolKey;
    fn tokens(&self) -> Vec<Token>;
    fn is_frozen(&self) -> bool;

    /// Live reserves, or the frozen snapshot if this instance is a
    /// simulation fork (`stop_updates = true`).
    fn get_reserves(&self) -> Vec<TokenAmount>;

    /// Pure function of reserves: how much `token_out` comes out for
    /// `amount_in`. `safety_bips` trims a small margin off the result so
    /// on-chain integer rounding never returns less than quoted.
    fn quote_out(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        safety_bips: u32,
    ) -> Result<TokenAmount, ArbError>;

    /// Returns a shallow fork with reserves `current + delta` and
    /// `stop_updates = true`. The receiver is unchanged.
    fn simulate_reserve_change(&self, delta: &[TokenAmount]) -> Result<Pool, ArbError>;

    /// How much this pool's reserves would move if `tx` lands, decomposed
    /// per token. Raises `MaxSpreadAssertion` if the tx's own belief
    /// price/max spread would cause on-chain rejection.
    fn reserve_delta_from_tx(&self, tx: &DecodedTx) -> Result<Vec<TokenAmount>, ArbError>;

    fn build_swap_ops(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        min_out: &TokenAmount,
    ) -> Result<SwapOps, ArbError>;
}

/// Sealed set of pool variants. Dispatch goes through this enum instead of
/// `dyn PoolOps` — callers that need variant-specific behavior (router
/// message decoding, the Terra market module's scalar `pool_delta`) match
/// on it directly.
#[derive(Debug, Clone)]
pub enum Pool {
    ConstantProduct(ConstantProductPool),
    Native(NativePool),
    Weighted(WeightedPool),
}

impl PoolOps for Pool {
    fn key(&self) -> &PoolKey {
        match self {
            Pool::ConstantProduct(p) => p.key(),
            Pool::Native(p) => p.key(),
            Pool::Weighted(p) => p.key(),
        }
    }

    fn tokens(&self) -> Vec<Token> {
        match self {
            Pool::ConstantProduct(p) => p.tokens(),
            Pool::Native(p) => p.tokens(),
            Pool::Weighted(p) => p.tokens(),
        }
    }

    fn is_frozen(&self) -> bool {
        match self {
            Pool::ConstantProduct(p) => p.is_frozen(),
            Pool::Native(p) => p.is_frozen(),
            Pool::Weighted(p) => p.is_frozen(),
        }
    }

    fn get_reserves(&self) -> Vec<TokenAmount> {
        match self {
            Pool::ConstantProduct(p) => p.get_reserves(),
            Pool::Native(p) => p.get_reserves(),
            Pool::Weighted(p) => p.get_reserves(),
        }
    }

    fn quote_out(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        safety_bips: u32,
    ) -> Result<TokenAmount, ArbError> {
        match self {
            Pool::ConstantProduct(p) => p.quote_out(amount_in, token_out, safety_bips),
            Pool::Native(p) => p.quote_out(amount_in, token_out, safety_bips),
            Pool::Weighted(p) => p.quote_out(amount_in, token_out, safety_bips),
        }
    }

    fn simulate_reserve_change(&self, delta: &[TokenAmount]) -> Result<Pool, ArbError> {
        match self {
            Pool::ConstantProduct(p) => p.simulate_reserve_change(delta),
            Pool::Native(p) => p.simulate_reserve_change(delta),
            Pool::Weighted(p) => p.simulate_reserve_change(delta),
        }
    }

    fn reserve_delta_from_tx(&self, tx: &DecodedTx) -> Result<Vec<TokenAmount>, ArbError> {
        match self {
            Pool::ConstantProduct(p) => p.reserve_delta_from_tx(tx),
            Pool::Native(p) => p.reserve_delta_from_tx(tx),
            Pool::Weighted(p) => p.reserve_delta_from_tx(tx),
        }
    }

    fn build_swap_ops(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        min_out: &TokenAmount,
    ) -> Result<SwapOps, ArbError> {
        match self {
            Pool::ConstantProduct(p) => p.build_swap_ops(amount_in, token_out, min_out),
            Pool::Native(p) => p.build_swap_ops(amount_in, token_out, min_out),
            Pool::Weighted(p) => p.build_swap_ops(amount_in, token_out, min_out),
        }
    }
}
