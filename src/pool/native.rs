//! Terra's `x/market` native swap module, modeled as a synthetic pool.
//!
//! Unlike a CosmWasm pair, the market module has no on-chain reserves to
//! read — its exchange rate comes from the oracle and a spread fee that
//! narrows to zero as `pool_delta` (a virtual-pool imbalance tracked only
//! off-chain, here) returns to zero. Grounded on
//! `native_liquidity_pair.py::NativeLiquidityPair`.

use crate::error::ArbError;
use crate::mempool::types::{CosmosMsg, DecodedTx};
use crate::pool::{Pool, PoolKey, PoolMsg, PoolOps, SwapOps};
use crate::token::{Token, TokenAmount};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct NativePool {
    key: PoolKey,
    luna: Token,
    stable: Token,
    /// Oracle exchange rate: 1 LUNA = `luna_exchange_rate` units of `stable`.
    luna_exchange_rate: Decimal,
    /// Virtual-pool imbalance accumulated by simulated swaps that include
    /// LUNA on either side; zero for a freshly constructed instance.
    pool_delta: Decimal,
    frozen: bool,
}

impl NativePool {
    pub fn new(key: PoolKey, luna: Token, stable: Token, luna_exchange_rate: Decimal) -> Self {
        Self { key, luna, stable, luna_exchange_rate, pool_delta: Decimal::ZERO, frozen: false }
    }

    fn involves_luna(&self, token: &Token) -> bool {
        token == &self.luna
    }

    /// `compute_swap_no_spread`: the oracle-rate conversion, spread-free.
    /// Terra's market module applies a spread on top of this in the
    /// contract itself; the engine quotes the spread-free rate and lets
    /// `MaxSpreadAssertion` reject txs whose embedded spread tolerance
    /// would fail on-chain, matching the original's division of concerns.
    fn convert(&self, amount_in: Decimal, token_in: &Token) -> Decimal {
        if token_in == &self.luna {
            amount_in * self.luna_exchange_rate
        } else {
            amount_in / self.luna_exchange_rate
        }
    }
}

impl PoolOps for NativePool {
    fn key(&self) -> &PoolKey {
        &self.key
    }

    fn tokens(&self) -> Vec<Token> {
        vec![self.luna.clone(), self.stable.clone()]
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn get_reserves(&self) -> Vec<TokenAmount> {
        // The market module has no literal reserves; pool_delta is exposed
        // as a signed LUNA-denominated quantity for debugging/logging.
        vec![TokenAmount::new(self.luna.clone(), self.pool_delta)]
    }

    fn quote_out(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        safety_bips: u32,
    ) -> Result<TokenAmount, ArbError> {
        if amount_in.token != self.luna && amount_in.token != self.stable {
            return Err(ArbError::MismatchedTokens {
                a: amount_in.token.symbol().to_string(),
                b: token_out.symbol().to_string(),
            });
        }
        let out = self.convert(amount_in.amount, &amount_in.token);
        Ok(TokenAmount::new(token_out.clone(), out).with_safety_margin(safety_bips))
    }

    fn simulate_reserve_change(&self, delta: &[TokenAmount]) -> Result<Pool, ArbError> {
        // Only adjust the scalar pool_delta when LUNA is one side of the
        // delta — mirrors the original only touching `_pool_delta_changes`
        // when LUNA participates in the simulated swap.
        let mut new_delta = self.pool_delta;
        for d in delta {
            if self.involves_luna(&d.token) {
                new_delta += d.amount;
            }
        }
        Ok(Pool::Native(NativePool {
            key: self.key.clone(),
            luna: self.luna.clone(),
            stable: self.stable.clone(),
            luna_exchange_rate: self.luna_exchange_rate,
            pool_delta: new_delta,
            frozen: true,
        }))
    }

    fn reserve_delta_from_tx(&self, tx: &DecodedTx) -> Result<Vec<TokenAmount>, ArbError> {
        let mut delta_luna = Decimal::ZERO;
        for msg in &tx.msgs {
            let CosmosMsg::NativeMarketSwap { offer, ask_denom } = msg else { continue };
            let is_relevant = (offer.token == self.luna && ask_denom == self.stable.identity())
                || (offer.token == self.stable && ask_denom == self.luna.identity());
            if !is_relevant {
                continue;
            }
            if offer.token == self.luna {
                delta_luna += offer.amount;
            } else {
                let out_luna = self.convert(offer.amount, &offer.token);
                delta_luna -= out_luna;
            }
        }
        Ok(vec![TokenAmount::new(self.luna.clone(), delta_luna)])
    }

    fn build_swap_ops(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        min_out: &TokenAmount,
    ) -> Result<SwapOps, ArbError> {
        let amount_out_estimate = self.quote_out(amount_in, token_out, 0)?;
        let description = format!(
            "market-swap {} {} -> min {} {}",
            amount_in.amount, amount_in.token, min_out.amount, token_out
        );
        Ok(SwapOps {
            amount_out_estimate,
            messages: vec![PoolMsg { pool: self.key.clone(), description }],
        })
    }
}
