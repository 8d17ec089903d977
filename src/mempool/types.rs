//! Decoded transaction shapes shared by the mempool watcher, tx filters,
//! and pool reserve-delta simulation.
//!
//! These are a deliberately narrow projection of the full Cosmos SDK `Tx` —
//! only the fields the arbitrage engine ever inspects (swap intents, pool
//! identities, belief price / max spread) are modeled, rather than a
//! complete proto mirror.

use crate::pool::PoolKey;
use crate::token::TokenAmount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One decoded message relevant to arbitrage detection. Anything else in a
/// transaction (governance votes, IBC packets, bank sends unrelated to a
/// pool) decodes to `Other` and is inert for every filter and pool.
#[derive(Debug, Clone, PartialEq)]
pub enum CosmosMsg {
    /// A direct `ExecuteMsg::Swap` against a Terraswap/Loop/Astroport pair.
    ContractSwap {
        pool: PoolKey,
        offer: TokenAmount,
        belief_price: Option<Decimal>,
        max_spread: Option<Decimal>,
    },
    /// A CW20 `Send { contract: pool, msg: Swap{..} }` wrapper around the same intent.
    Cw20Send {
        pool: PoolKey,
        offer: TokenAmount,
        belief_price: Option<Decimal>,
        max_spread: Option<Decimal>,
    },
    /// A Terra `x/market` native swap (LUNA <-> stablecoin).
    NativeMarketSwap { offer: TokenAmount, ask_denom: String },
    /// An Astroport/Terraswap router `execute_swap_operations` call.
    RouterSwap { router: String, hops: Vec<PoolKey>, offer: TokenAmount },
    /// An Osmosis GAMM `MsgSwapExactAmountIn`.
    OsmosisSwapExactAmountIn {
        routes: Vec<(PoolKey, String)>,
        token_in: TokenAmount,
        token_out_min_denom: String,
    },
    /// An Osmosis GAMM `MsgSwapExactAmountOut`. Reserve-delta extraction for
    /// this variant is a known gap carried forward unimplemented (see
    /// DESIGN.md, Open Question #3) — it decodes but yields a zero delta.
    OsmosisSwapExactAmountOut {
        routes: Vec<(PoolKey, String)>,
        token_out: TokenAmount,
    },
    /// Anything not relevant to arbitrage detection.
    Other,
}

impl CosmosMsg {
    /// Pool identities this message touches, used by the tx filter DSL and
    /// by the broadcaster's duplicate-pool-set check.
    pub fn touched_pools(&self) -> Vec<PoolKey> {
        match self {
            CosmosMsg::ContractSwap { pool, .. } | CosmosMsg::Cw20Send { pool, .. } => {
                vec![pool.clone()]
            }
            CosmosMsg::RouterSwap { hops, .. } => hops.clone(),
            CosmosMsg::OsmosisSwapExactAmountIn { routes, .. }
            | CosmosMsg::OsmosisSwapExactAmountOut { routes, .. } => {
                routes.iter().map(|(p, _)| p.clone()).collect()
            }
            CosmosMsg::NativeMarketSwap { .. } | CosmosMsg::Other => Vec::new(),
        }
    }
}

/// A pending transaction decoded from raw bytes observed in the mempool, or
/// read back off a finalized block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTx {
    /// The raw tx string as received — doubles as the mempool cache key.
    pub raw: String,
    pub msgs: Vec<CosmosMsg>,
}

impl DecodedTx {
    pub fn msg_count(&self) -> usize {
        self.msgs.len()
    }
}

/// Mempool entries for one raw tx: `None` marks a decode failure, cached so
/// the watcher does not re-attempt decoding the same bytes every poll.
pub type CacheEntry = Option<DecodedTx>;

/// Wire shape of one raw pending transaction fetched via `unconfirmed_txs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMempoolTx {
    pub tx: String,
}
