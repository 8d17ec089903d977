//! Osmosis GAMM weighted pool.
//!
//! `y = r_in / (r_in + in*(1-fee)); out = r_out * (1 - y^(w_in/w_out))`, with
//! a conservative rounding-safety margin subtracted when the two hops'
//! weights differ, mirroring `osmosis/liquidity_pair.py::GAMMLiquidityPool`.

use crate::error::ArbError;
use crate::mempool::types::{CosmosMsg, DecodedTx};
use crate::pool::{Pool, PoolKey, PoolMsg, PoolOps, SwapOps};
use crate::token::{Token, TokenAmount};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const PRECISION: u32 = 18;
pub const MIN_RESERVE: Decimal = dec!(0.01);
const ROUND_RATIO_MUL: f64 = 2.0;
const ROUND_RATIO_POW: f64 = 1.7;
const MAX_ADJUSTMENT_PCT: Decimal = dec!(0.00001);

#[derive(Debug, Clone)]
pub struct WeightedPool {
    key: PoolKey,
    tokens: Vec<Token>,
    reserves: Vec<Decimal>,
    weights: Vec<Decimal>,
    swap_fee: Decimal,
    frozen: bool,
}

impl WeightedPool {
    pub fn new(
        key: PoolKey,
        tokens: Vec<Token>,
        reserves: Vec<Decimal>,
        weights: Vec<Decimal>,
        swap_fee: Decimal,
    ) -> Self {
        assert_eq!(tokens.len(), reserves.len());
        assert_eq!(tokens.len(), weights.len());
        Self { key, tokens, reserves, weights, swap_fee, frozen: false }
    }

    fn index_of(&self, token: &Token) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    /// `get_amount_out_exact_in`.
    fn amount_out(&self, amount_in: Decimal, i: usize, o: usize) -> Result<Decimal, ArbError> {
        let reserve_in = self.reserves[i];
        let reserve_out = self.reserves[o];
        if reserve_in < MIN_RESERVE || reserve_out < MIN_RESERVE {
            return Err(ArbError::InsufficientLiquidity { pool_id: self.key.pool_id.clone() });
        }
        let weight_in = self.weights[i];
        let weight_out = self.weights[o];

        let adjusted_in = amount_in * (Decimal::ONE - self.swap_fee);
        let y = reserve_in / (reserve_in + adjusted_in);
        let exponent = (weight_in / weight_out).to_f64().unwrap_or(1.0);
        let y_f = y.to_f64().unwrap_or(1.0);
        let bar = 1.0 - y_f.powf(exponent);
        let mut amount_out = reserve_out.to_f64().unwrap_or(0.0) * bar;

        if weight_in != weight_out {
            let ratio = (reserve_out.to_f64().unwrap_or(0.0) / weight_out.to_f64().unwrap_or(1.0))
                / (reserve_in.to_f64().unwrap_or(1.0) / weight_in.to_f64().unwrap_or(1.0)).powf(ROUND_RATIO_POW);
            let scale = 10f64.powi(-(PRECISION as i32));
            let margin_uncapped = ROUND_RATIO_MUL * ratio * scale;
            let cap = amount_out * MAX_ADJUSTMENT_PCT.to_f64().unwrap_or(0.00001);
            let margin = margin_uncapped.min(cap).max(0.0);
            amount_out -= margin;
        }

        Ok(Decimal::from_f64_retain(amount_out.max(0.0)).unwrap_or(Decimal::ZERO))
    }
}

impl PoolOps for WeightedPool {
    fn key(&self) -> &PoolKey {
        &self.key
    }

    fn tokens(&self) -> Vec<Token> {
        self.tokens.clone()
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn get_reserves(&self) -> Vec<TokenAmount> {
        self.tokens
            .iter()
            .zip(self.reserves.iter())
            .map(|(t, r)| TokenAmount::new(t.clone(), *r))
            .collect()
    }

    fn quote_out(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        safety_bips: u32,
    ) -> Result<TokenAmount, ArbError> {
        let i = self.index_of(&amount_in.token).ok_or_else(|| ArbError::MismatchedTokens {
            a: amount_in.token.symbol().to_string(),
            b: token_out.symbol().to_string(),
        })?;
        let o = self.index_of(token_out).ok_or_else(|| ArbError::MismatchedTokens {
            a: amount_in.token.symbol().to_string(),
            b: token_out.symbol().to_string(),
        })?;
        let out = self.amount_out(amount_in.amount, i, o)?;
        Ok(TokenAmount::new(token_out.clone(), out).with_safety_margin(safety_bips))
    }

    fn simulate_reserve_change(&self, delta: &[TokenAmount]) -> Result<Pool, ArbError> {
        let mut reserves = self.reserves.clone();
        for d in delta {
            if let Some(idx) = self.index_of(&d.token) {
                reserves[idx] += d.amount;
            }
        }
        Ok(Pool::Weighted(WeightedPool {
            key: self.key.clone(),
            tokens: self.tokens.clone(),
            reserves,
            weights: self.weights.clone(),
            swap_fee: self.swap_fee,
            frozen: true,
        }))
    }

    fn reserve_delta_from_tx(&self, tx: &DecodedTx) -> Result<Vec<TokenAmount>, ArbError> {
        let mut total = vec![Decimal::ZERO; self.tokens.len()];
        for msg in &tx.msgs {
            match msg {
                CosmosMsg::OsmosisSwapExactAmountIn { routes, token_in, .. } => {
                    let Some(i) = self.index_of(&token_in.token) else { continue };
                    let touches_this_pool = routes.iter().any(|(p, _)| p == &self.key);
                    if !touches_this_pool {
                        continue;
                    }
                    // Walk the hop list; only the leg that actually uses this
                    // pool id contributes to its reserve delta.
                    let mut amount = token_in.amount;
                    let mut cur = i;
                    for (pool_key, out_denom) in routes {
                        let out_token = self
                            .tokens
                            .iter()
                            .find(|t| t.identity() == out_denom)
                            .cloned();
                        let Some(out_token) = out_token else { break };
                        let Some(o) = self.index_of(&out_token) else {
                            // hop leaves this pool's token set; stop tracking
                            break;
                        };
                        if pool_key == &self.key {
                            let out = self.amount_out(amount, cur, o)?;
                            total[cur] += amount;
                            total[o] -= out;
                            amount = out;
                        }
                        cur = o;
                    }
                }
                CosmosMsg::OsmosisSwapExactAmountOut { routes, .. } => {
                    // Known gap: reserve-delta extraction for exact-amount-out
                    // swaps is not implemented (see DESIGN.md Open Question #3).
                    if routes.iter().any(|(p, _)| p == &self.key) {
                        tracing::debug!(
                            pool = %self.key.pool_id,
                            "MsgSwapExactAmountOut reserve delta not implemented, treating as zero"
                        );
                    }
                }
                _ => continue,
            }
        }
        Ok(self
            .tokens
            .iter()
            .zip(total.iter())
            .map(|(t, d)| TokenAmount::new(t.clone(), *d))
            .collect())
    }

    fn build_swap_ops(
        &self,
        amount_in: &TokenAmount,
        token_out: &Token,
        min_out: &TokenAmount,
    ) -> Result<SwapOps, ArbError> {
        let amount_out_estimate = self.quote_out(amount_in, token_out, 0)?;
        let description = format!(
            "gamm-swap-exact-in pool={} {} {} -> min {} {}",
            self.key.pool_id, amount_in.amount, amount_in.token, min_out.amount, token_out
        );
        Ok(SwapOps {
            amount_out_estimate,
            messages: vec![PoolMsg { pool: self.key.clone(), description }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn equal_weight_pool() -> WeightedPool {
        let atom = Token::native("uatom", "ATOM", 6);
        let osmo = Token::native("uosmo", "OSMO", 6);
        WeightedPool::new(
            PoolKey::new("osmosis-1", "1"),
            vec![atom, osmo],
            vec![dec!(1000000), dec!(1000000)],
            vec![dec!(0.5), dec!(0.5)],
            dec!(0.002),
        )
    }

    #[test]
    fn equal_weights_skip_rounding_margin() {
        let p = equal_weight_pool();
        let osmo = p.tokens[1].clone();
        let amount_in = TokenAmount::new(p.tokens[0].clone(), dec!(1000));
        // equal-weight constant product: out_before_fee = r_out*in/(r_in+in)
        let out = p.quote_out(&amount_in, &osmo, 0).unwrap();
        assert!(out.amount > Decimal::ZERO);
        assert!(out.amount < dec!(1000));
    }

    #[test]
    fn insufficient_liquidity_is_rejected() {
        let atom = Token::native("uatom", "ATOM", 6);
        let osmo = Token::native("uosmo", "OSMO", 6);
        let p = WeightedPool::new(
            PoolKey::new("osmosis-1", "2"),
            vec![atom.clone(), osmo.clone()],
            vec![Decimal::ZERO, dec!(1000000)],
            vec![dec!(0.5), dec!(0.5)],
            dec!(0.002),
        );
        let err = p.quote_out(&TokenAmount::new(atom, dec!(1)), &osmo, 0).unwrap_err();
        assert!(matches!(err, ArbError::InsufficientLiquidity { .. }));
    }
}
