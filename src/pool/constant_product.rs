//! Constant-product AMM pool (Terraswap / Loop / Astroport-shaped pairs).
//!
//! `out = (reserve_out * in) / (reserve_in + in) * (1 - fee_rate)`, with an
//! optional stability tax deducted from the output after the fee when the
//! output token is a Terra native denom — grounded on
//! `terraswap/liquidity_pair.py::get_swap_amounts`.

use crate::error::ArbError;
use crate::mempool::types::{CosmosMsg, DecodedTx};
use crate::pool::{Pool, PoolKey, PoolMsg, PoolOps, SwapOps};
use crate::token::{Token, TokenAmount};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Default swap fee charged by Terraswap-family pairs (0.3%).
pub const DEFAULT_FEE_RATE: Decimal = dec!(0.003);

/// Maximum slippage the engine accepts between its own rational quote and
/// the pool's integer-rounded on-chain result before treating it as a
/// meaningfully different number (not a hard revert threshold).
pub const MAX_SWAP_SLIPPAGE: Decimal = dec!(0.00001);

/// Computes the stability tax levied on a native-token output. Zero for any
/// deployment that is not Terra classic/2's market-taxed denoms (the
/// default), pluggable so other chains never pay a phantom tax.
pub trait TaxPolicy: std::fmt::Debug + Send + Sync {
    fn tax_on(&self, token: &Token, amount: Decimal) -> Decimal;
}

#[derive(Debug, Clone, Default)]
pub struct NoTax;

impl TaxPolicy for NoTax {
    fn tax_on(&self, _token: &Token, _amount: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct ConstantProductPool {
    key: PoolKey,
    tokens: [Token; 2],
    reserves: [Decimal; 2],
    fee_rate: Decimal,
    tax_policy: Arc<dyn TaxPolicy>,
    frozen: bool,
}

impl ConstantProductPool {
    pub fn new(key: PoolKey, tokens: [Token; 2], reserves: [Decimal; 2]) -> Self {
        Self {
            key,
            tokens,
            reserves,
            fee_rate: DEFAULT_FEE_RATE,
            tax_policy: Arc::new(NoTax),
            frozen: false,
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_tax_policy(mut self, policy: Arc<dyn TaxPolicy>) -> Self {
        self.tax_policy = policy;
        self
    }

    fn index_of(&self, token: &Token) -> Option<usize> {
        self.tokens.iter().position(|t| t == token)
    }

    fn reserve_pair(&self, token_in: &Token, token_out: &Token) -> Option<(usize, usize)> {
        let i = self.index_of(token_in)?;
        let o = self.index_of(token_out)?;
        if i == o {
            return None;
        }
        Some((i, o))
    }

    /// `get_swap_amounts`: fee then tax, both subtracted from the raw
    /// constant-product output. Returns `(amount_out, spread)` where
    /// `spread` is the realized slippage relative to the pool's spot price.
    fn swap_amounts(&self, amount_in: Decimal, i: usize, o: usize) -> (Decimal, Decimal) {
        let reserve_in = self.reserves[i];
        let reserve_out = self.reserves[o];

        let out_before_fee = (reserve_out * amount_in) / (reserve_in + amount_in);
        let out_after_fee = out_before_fee * (Decimal::ONE - self.fee_rate);
        let tax = self.tax_policy.tax_on(&self.tokens[o], out_after_fee);
        let out_after_tax = (out_after_fee - tax).max(Decimal::ZERO);

        let spot_out = if reserve_in.is_zero() { Decimal::ZERO } else { reserve_out * amount_in / reserve_in };
        let spread = if spot_out.is_zero() {
            Decimal::ZERO
        } else {
            (spot_out - out_after_fee) / spot_out
        };

        (out_after_tax, spread)
    }

    /// Raises `MaxSpreadAssertion` if `belief_price`/`max_spread` embedded in
    /// a pending tx would cause the on-chain contract to reject it.
    fn assert_max_spread(
        &self,
        amount_in: Decimal,
        i: usize,
        o: usize,
        belief_price: Option<Decimal>,
        max_spread: Option<Decimal>,
    ) -> Result<(), ArbError> {
        let (Some(belief_price), Some(max_spread)) = (belief_price, max_spread) else {
            return Ok(());
        };
        let (amount_out, spread) = self.swap_amounts(amount_in, i, o);
        let expected_out = amount_in / belief_price;
        let belief_spread = if expected_out.is_zero() {
            Decimal::ZERO
        } else {
            ((expected_out - amount_out) / expected_out).max(Decimal::ZERO)
        };
        if belief_spread > max_spread || spread > max_spread {
            return Err(ArbError::MaxSpreadAssertion {
                expected: max_spread.to_string(),
                realized: belief_spread.max(spread).to_string(),
            });
        }
        Ok(())
    }
}

impl PoolOps for ConstantProductPool {
    fn key(&self) -> &PoolKey {
        &self.key
    }

    fn tokens(&self) -> Vec<Token> {
        self.tokens.to_vec()
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
        let (i, o) = self
            .reserve_pair(&amount_in.token, token_out)
            .ok_or_else(|| ArbError::MismatchedTokens {
                a: amount_in.token.symbol().to_string(),
                b: token_out.symbol().to_string(),
            })?;
        let (out, _spread) = self.swap_amounts(amount_in.amount, i, o);
        let result = TokenAmount::new(token_out.clone(), out);
        Ok(result.with_safety_margin(safety_bips))
    }

    fn simulate_reserve_change(&self, delta: &[TokenAmount]) -> Result<Pool, ArbError> {
        let mut reserves = self.reserves;
        for d in delta {
            if let Some(idx) = self.index_of(&d.token) {
                reserves[idx] += d.amount;
            }
        }
        Ok(Pool::ConstantProduct(ConstantProductPool {
            key: self.key.clone(),
            tokens: self.tokens.clone(),
            reserves,
            fee_rate: self.fee_rate,
            tax_policy: self.tax_policy.clone(),
            frozen: true,
        }))
    }

    fn reserve_delta_from_tx(&self, tx: &DecodedTx) -> Result<Vec<TokenAmount>, ArbError> {
        let mut total = vec![Decimal::ZERO; 2];
        for msg in &tx.msgs {
            let (pool, offer, belief_price, max_spread) = match msg {
                CosmosMsg::ContractSwap { pool, offer, belief_price, max_spread }
                | CosmosMsg::Cw20Send { pool, offer, belief_price, max_spread } => {
                    (pool, offer, *belief_price, *max_spread)
                }
                _ => continue,
            };
            if pool != &self.key {
                continue;
            }
            let Some(i) = self.index_of(&offer.token) else { continue };
            let o = 1 - i;
            self.assert_max_spread(offer.amount, i, o, belief_price, max_spread)?;
            let (out, _) = self.swap_amounts(offer.amount, i, o);
            total[i] += offer.amount;
            total[o] -= out;
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
        let description = match &amount_in.token {
            Token::Cw20 { .. } => format!(
                "cw20-send swap {} {} -> min {} {} via {}",
                amount_in.amount, amount_in.token, min_out.amount, token_out, self.key.pool_id
            ),
            Token::NativeDenom { .. } => format!(
                "direct-coin swap {} {} -> min {} {} via {}",
                amount_in.amount, amount_in.token, min_out.amount, token_out, self.key.pool_id
            ),
        };
        Ok(SwapOps {
            amount_out_estimate,
            messages: vec![PoolMsg { pool: self.key.clone(), description }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ConstantProductPool {
        let ust = Token::native("uusd", "UST", 6);
        let luna = Token::native("uluna", "LUNA", 6);
        ConstantProductPool::new(
            PoolKey::new("columbus-5", "terra1pair"),
            [ust, luna],
            [dec!(1000000), dec!(2000000)],
        )
    }

    #[test]
    fn pure_cp_amm_swap_quote() {
        let p = pool();
        let luna = p.tokens[1].clone();
        let amount_in = TokenAmount::new(p.tokens[0].clone(), dec!(10000));
        let out = p.quote_out(&amount_in, &luna, 0).unwrap();
        // 2_000_000 * 10_000 / 1_010_000 = 19801.980198..., * 0.997 = 19742.574...
        assert_eq!(out.int_amount(), 19_742);
    }

    #[test]
    fn quote_is_monotonic_and_bounded_by_spot_price() {
        let p = pool();
        let luna = p.tokens[1].clone();
        let small = p.quote_out(&TokenAmount::new(p.tokens[0].clone(), dec!(100)), &luna, 0).unwrap();
        let big = p.quote_out(&TokenAmount::new(p.tokens[0].clone(), dec!(10000)), &luna, 0).unwrap();
        assert!(big.amount > small.amount);

        let spot_price = p.reserves[1] / p.reserves[0];
        let marginal_upper_bound = dec!(10000) * spot_price;
        assert!(big.amount <= marginal_upper_bound);
    }

    #[test]
    fn simulate_reserve_change_is_pure() {
        let p = pool();
        let delta = vec![
            TokenAmount::new(p.tokens[0].clone(), dec!(5000)),
            TokenAmount::new(p.tokens[1].clone(), dec!(-9925)),
        ];
        let forked = p.simulate_reserve_change(&delta).unwrap();
        assert_eq!(forked.get_reserves()[0].amount, dec!(1005000));
        // original pool untouched
        assert_eq!(p.get_reserves()[0].amount, dec!(1000000));
        assert!(forked.is_frozen());
    }

    #[test]
    fn max_spread_assertion_rejects_bad_belief_price() {
        let p = pool();
        let tx = DecodedTx {
            raw: "raw".into(),
            msgs: vec![CosmosMsg::ContractSwap {
                pool: p.key.clone(),
                offer: TokenAmount::new(p.tokens[0].clone(), dec!(10000)),
                belief_price: Some(dec!(0.01)), // wildly off from spot (~0.5)
                max_spread: Some(dec!(0.01)),
            }],
        };
        let err = p.reserve_delta_from_tx(&tx).unwrap_err();
        assert!(matches!(err, ArbError::MaxSpreadAssertion { .. }));
    }
}
