//! Mempool-driven reserve simulation (§4.8 step 1, §9 "Coroutine control
//! flow"): builds the per-pool forked-reserve overlay consumed by
//! [`crate::pool::registry::ReserveSimulationScope`].
//!
//! For every pool touched by the filtered mempool, accumulates
//! `reserve_delta_from_tx` across its pending transactions — skipping any
//! that would fail their own max-spread check, per §4.2 — and forks the
//! pool once with the summed delta.

use crate::error::ArbError;
use crate::mempool::types::DecodedTx;
use crate::pool::registry::PoolRegistry;
use crate::pool::{Pool, PoolKey, PoolOps};
use crate::token::{Token, TokenAmount};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Builds the `{pool -> forked pool}` overlay for one planning cycle. Pools
/// not yet constructed in `registry` are left out of the map entirely
/// (nothing to fork against).
pub async fn build_overlay(
    registry: &PoolRegistry,
    filtered_mempool: &HashMap<PoolKey, Vec<DecodedTx>>,
) -> Result<HashMap<PoolKey, Pool>, ArbError> {
    let mut overlay = HashMap::new();

    for (pool_key, txs) in filtered_mempool {
        let Some(base) = registry.peek(pool_key) else {
            continue;
        };

        let mut totals: HashMap<Token, Decimal> = HashMap::new();
        for tx in txs {
            match base.reserve_delta_from_tx(tx) {
                Ok(deltas) => {
                    for d in deltas {
                        *totals.entry(d.token).or_insert(Decimal::ZERO) += d.amount;
                    }
                }
                Err(ArbError::MaxSpreadAssertion { expected, realized }) => {
                    debug!(
                        pool = %pool_key.pool_id,
                        expected,
                        realized,
                        "skipping pending tx that would fail max-spread on-chain"
                    );
                }
                Err(other) => return Err(other),
            }
        }

        if totals.values().all(|v| v.is_zero()) {
            continue;
        }

        let deltas: Vec<TokenAmount> =
            totals.into_iter().map(|(token, amount)| TokenAmount::new(token, amount)).collect();
        let forked = base.simulate_reserve_change(&deltas)?;
        overlay.insert(pool_key.clone(), forked);
    }

    Ok(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mempool::types::CosmosMsg;
    use crate::pool::ConstantProductPool;
    use rust_decimal_macros::dec;

    fn pool_key() -> PoolKey {
        PoolKey::new("columbus-5", "pair1")
    }

    fn ust() -> Token {
        Token::native("uusd", "UST", 6)
    }

    fn luna() -> Token {
        Token::native("uluna", "LUNA", 6)
    }

    fn swap_tx(amount: Decimal) -> DecodedTx {
        DecodedTx {
            raw: "tx".into(),
            msgs: vec![CosmosMsg::ContractSwap {
                pool: pool_key(),
                offer: TokenAmount::new(ust(), amount),
                belief_price: None,
                max_spread: None,
            }],
        }
    }

    #[tokio::test]
    async fn overlay_forks_with_accumulated_delta() {
        let registry = PoolRegistry::new();
        registry
            .get_or_build(&pool_key(), || async {
                Ok(Pool::ConstantProduct(ConstantProductPool::new(
                    pool_key(),
                    [ust(), luna()],
                    [dec!(1000000), dec!(1000000)],
                )))
            })
            .await
            .unwrap();

        let mut filtered = HashMap::new();
        filtered.insert(pool_key(), vec![swap_tx(dec!(5000)), swap_tx(dec!(2000))]);

        let overlay = build_overlay(&registry, &filtered).await.unwrap();
        let forked = overlay.get(&pool_key()).unwrap();
        let reserves = forked.get_reserves();
        let ust_reserve = reserves.iter().find(|a| a.token == ust()).unwrap();
        assert_eq!(ust_reserve.amount, dec!(1007000));
    }

    #[tokio::test]
    async fn pool_absent_from_registry_is_skipped() {
        let registry = PoolRegistry::new();
        let mut filtered = HashMap::new();
        filtered.insert(pool_key(), vec![swap_tx(dec!(5000))]);
        let overlay = build_overlay(&registry, &filtered).await.unwrap();
        assert!(overlay.is_empty());
    }

    #[tokio::test]
    async fn max_spread_violation_is_skipped_not_propagated() {
        let registry = PoolRegistry::new();
        registry
            .get_or_build(&pool_key(), || async {
                Ok(Pool::ConstantProduct(ConstantProductPool::new(
                    pool_key(),
                    [ust(), luna()],
                    [dec!(1000000), dec!(1000000)],
                )))
            })
            .await
            .unwrap();

        let bad_tx = DecodedTx {
            raw: "bad".into(),
            msgs: vec![CosmosMsg::ContractSwap {
                pool: pool_key(),
                offer: TokenAmount::new(ust(), dec!(10000)),
                belief_price: Some(dec!(0.01)),
                max_spread: Some(dec!(0.01)),
            }],
        };
        let mut filtered = HashMap::new();
        filtered.insert(pool_key(), vec![bad_tx]);

        let overlay = build_overlay(&registry, &filtered).await.unwrap();
        assert!(overlay.is_empty());
    }
}
