//! Route graph: multi-hop sequences of pools, cycle detection, and the two
//! operations the arbitrage engine drives them through — quoting and
//! building the on-chain message sequence.
//!
//! Grounded on `original_source/src/chains/cosmos/terra/route.py`.

use crate::error::ArbError;
use crate::pool::{Pool, PoolKey, PoolMsg, PoolOps};
use crate::token::{Token, TokenAmount};

/// An ordered hop sequence: `tokens[i] -> tokens[i+1]` via `pools[i]`.
#[derive(Debug, Clone)]
pub struct Route {
    pub tokens: Vec<Token>,
    pub pool_keys: Vec<PoolKey>,
}

impl Route {
    pub fn new(tokens: Vec<Token>, pool_keys: Vec<PoolKey>) -> Self {
        debug_assert_eq!(tokens.len(), pool_keys.len() + 1);
        Self { tokens, pool_keys }
    }

    pub fn is_cycle(&self) -> bool {
        self.tokens.first() == self.tokens.last()
    }

    fn hop_tokens(&self, reverse: bool) -> (Vec<Token>, Vec<PoolKey>) {
        if reverse {
            let mut tokens = self.tokens.clone();
            tokens.reverse();
            let mut keys = self.pool_keys.clone();
            keys.reverse();
            (tokens, keys)
        } else {
            (self.tokens.clone(), self.pool_keys.clone())
        }
    }

    /// Sequentially quotes each hop, threading the output as the next
    /// input. `pool_lookup` resolves a hop's `PoolKey` to the live (or
    /// simulated-fork) `Pool` instance.
    pub fn quote(
        &self,
        amount_in: &TokenAmount,
        reverse: bool,
        safety_bips: u32,
        pool_lookup: impl Fn(&PoolKey) -> Option<Pool>,
    ) -> Result<TokenAmount, ArbError> {
        let (tokens, keys) = self.hop_tokens(reverse);
        let mut current = amount_in.clone();
        for (i, key) in keys.iter().enumerate() {
            let pool = pool_lookup(key).ok_or_else(|| ArbError::NotContract { address: key.pool_id.clone() })?;
            let token_out = &tokens[i + 1];
            current = pool.quote_out(&current, token_out, safety_bips)?;
        }
        Ok(current)
    }

    /// Builds the concatenated message sequence for every hop. Cosmos
    /// router contracts that can execute a multi-hop swap atomically are
    /// modeled as a single pool whose `build_swap_ops` already emits one
    /// message (see `ConstantProductPool`'s router-aware construction);
    /// plain hop-by-hop routes emit one message per pool here.
    pub fn build_ops(
        &self,
        amount_in: &TokenAmount,
        reverse: bool,
        min_out: &TokenAmount,
        pool_lookup: impl Fn(&PoolKey) -> Option<Pool>,
    ) -> Result<(TokenAmount, Vec<PoolMsg>), ArbError> {
        let (tokens, keys) = self.hop_tokens(reverse);
        let mut current = amount_in.clone();
        let mut messages = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let pool = pool_lookup(key).ok_or_else(|| ArbError::NotContract { address: key.pool_id.clone() })?;
            let token_out = &tokens[i + 1];
            let is_last = i == keys.len() - 1;
            let hop_min_out = if is_last { min_out.clone() } else { TokenAmount::zero(token_out.clone()) };
            let ops = pool.build_swap_ops(&current, token_out, &hop_min_out)?;
            current = ops.amount_out_estimate;
            messages.extend(ops.messages);
        }
        Ok((current, messages))
    }

    /// Quotes both directions at a small seed input and returns whether the
    /// reverse direction is more profitable. Ties prefer forward (strict
    /// `>`), matching `amount_reverse > amount_forward`.
    pub fn should_reverse(
        &self,
        seed_amount: &TokenAmount,
        pool_lookup: impl Fn(&PoolKey) -> Option<Pool> + Copy,
    ) -> Result<bool, ArbError> {
        let forward = self.quote(seed_amount, false, 0, pool_lookup)?;
        let reverse_seed = TokenAmount::new(self.tokens.last().unwrap().clone(), seed_amount.amount);
        let reverse = self.quote(&reverse_seed, true, 0, pool_lookup)?;
        Ok(reverse.amount > forward.amount)
    }
}

/// One hop's set of candidate pools (parallel liquidity venues for the same
/// token pair); a `MultiRoute` is the cartesian product of these across all
/// hops, materialized into a flat list of concrete [`Route`]s.
#[derive(Debug, Clone)]
pub struct RouteStep {
    pub candidates: Vec<PoolKey>,
}

#[derive(Debug, Clone)]
pub struct MultiRoute {
    pub tokens: Vec<Token>,
    pub steps: Vec<RouteStep>,
}

impl MultiRoute {
    /// Expands the cartesian product of per-hop pool candidates into
    /// concrete routes, mirroring how the original builds `RoutePools`
    /// instances out of `list_steps`.
    pub fn materialize(&self) -> Vec<Route> {
        let mut combos: Vec<Vec<PoolKey>> = vec![vec![]];
        for step in &self.steps {
            let mut next = Vec::with_capacity(combos.len() * step.candidates.len());
            for combo in &combos {
                for candidate in &step.candidates {
                    let mut extended = combo.clone();
                    extended.push(candidate.clone());
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos
            .into_iter()
            .map(|pool_keys| Route::new(self.tokens.clone(), pool_keys))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConstantProductPool;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn two_hop_cycle() -> (Route, HashMap<PoolKey, Pool>) {
        let ust = Token::native("uusd", "UST", 6);
        let luna = Token::native("uluna", "LUNA", 6);

        let p1_key = PoolKey::new("columbus-5", "pair1");
        let p1 = Pool::ConstantProduct(ConstantProductPool::new(
            p1_key.clone(),
            [ust.clone(), luna.clone()],
            [dec!(1000000), dec!(2000000)],
        ));

        let p2_key = PoolKey::new("columbus-5", "pair2");
        let p2 = Pool::ConstantProduct(ConstantProductPool::new(
            p2_key.clone(),
            [luna.clone(), ust.clone()],
            [dec!(2100000), dec!(1050000)],
        ));

        let mut pools = HashMap::new();
        pools.insert(p1_key.clone(), p1);
        pools.insert(p2_key.clone(), p2);

        let route = Route::new(vec![ust.clone(), luna, ust], vec![p1_key, p2_key]);
        (route, pools)
    }

    #[test]
    fn two_hop_route_is_a_cycle() {
        let (route, _) = two_hop_cycle();
        assert!(route.is_cycle());
    }

    #[test]
    fn should_reverse_picks_more_profitable_direction() {
        let (route, pools) = two_hop_cycle();
        let seed = TokenAmount::new(route.tokens[0].clone(), dec!(100));
        let lookup = |k: &PoolKey| pools.get(k).cloned();
        // whichever direction is picked, quoting it directly must exceed
        // quoting the other direction (ties excluded since reserves differ).
        let reverse = route.should_reverse(&seed, lookup).unwrap();
        let forward_out = route.quote(&seed, false, 0, lookup).unwrap();
        let reverse_seed = TokenAmount::new(route.tokens.last().unwrap().clone(), seed.amount);
        let reverse_out = route.quote(&reverse_seed, true, 0, lookup).unwrap();
        assert_eq!(reverse, reverse_out.amount > forward_out.amount);
    }

    #[test]
    fn multi_route_materializes_cartesian_product() {
        let ust = Token::native("uusd", "UST", 6);
        let luna = Token::native("uluna", "LUNA", 6);
        let mr = MultiRoute {
            tokens: vec![ust, luna],
            steps: vec![RouteStep {
                candidates: vec![PoolKey::new("c", "a"), PoolKey::new("c", "b")],
            }],
        };
        assert_eq!(mr.materialize().len(), 2);
    }
}
