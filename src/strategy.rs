//! Strategy driver (§4.10): owns a sequence of [`RouteEngine`] instances and
//! a union of their mempool filters, fans their per-block work out
//! concurrently, and arbitrates routes that would otherwise broadcast
//! against the same pool in the same block.
//!
//! Grounded on `original_source/src/arbitrage/strategy.py::run_strategy`
//! (the new-block detection, fire-and-forget broadcaster re-election, and
//! the `max_n_blocks` test/dry-run escape hatch).

use crate::arbitrage::{EngineState, RouteEngine};
use crate::broadcaster::BroadcasterFleet;
use crate::error::ArbError;
use crate::filters::{contract_swap_matches, Filter};
use crate::mempool::types::DecodedTx;
use crate::mempool::watcher::MempoolWatcher;
use crate::pool::PoolKey;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One driven route: its engine plus the pool set and filter key used to
/// carve its slice out of a polled mempool.
struct RouteSlot {
    filter_key: String,
    engine: RouteEngine,
    candidate_pools: Vec<PoolKey>,
}

/// Drives N [`RouteEngine`]s against one chain's mempool watcher, optionally
/// coordinating broadcasts through a [`BroadcasterFleet`].
pub struct StrategyDriver {
    routes: Vec<RouteSlot>,
    watcher: MempoolWatcher,
    fleet: Option<Arc<BroadcasterFleet>>,
    /// `Some(n)` stops the loop after `n` new blocks have been processed;
    /// used by integration tests and dry-run entry points. `None` runs
    /// forever.
    max_n_blocks: Option<u64>,
}

impl StrategyDriver {
    pub fn new(
        routes: Vec<RouteEngine>,
        watcher: MempoolWatcher,
        fleet: Option<Arc<BroadcasterFleet>>,
        max_n_blocks: Option<u64>,
    ) -> Self {
        let routes = routes
            .into_iter()
            .enumerate()
            .map(|(i, engine)| {
                let candidate_pools = engine.candidate_pools();
                RouteSlot { filter_key: format!("route_{i}"), engine, candidate_pools }
            })
            .collect();
        Self { routes, watcher, fleet, max_n_blocks }
    }

    /// Union of every route's mempool filter, keyed by its slot name. A
    /// route's filter matches any tx that touches one of its candidate
    /// pools.
    fn filters(&self) -> HashMap<String, Filter> {
        self.routes
            .iter()
            .filter_map(|slot| {
                slot.candidate_pools
                    .iter()
                    .cloned()
                    .map(contract_swap_matches)
                    .reduce(|a, b| a | b)
                    .map(|f| (slot.filter_key.clone(), f))
            })
            .collect()
    }

    /// Runs until `max_n_blocks` new blocks have been processed, or forever
    /// if unset.
    pub async fn run(&mut self) -> Result<(), ArbError> {
        let mut blocks_processed: u64 = 0;

        loop {
            let filters = self.filters();
            let (height, mut matches) = self.watcher.iter_height_mempool(&filters).await?;

            let is_new_block = self.routes.iter().any(|slot| height > slot.engine.last_run_height());

            if is_new_block {
                if let Some(fleet) = self.fleet.clone() {
                    tokio::spawn(async move {
                        fleet.elect(height).await;
                    });
                }
                blocks_processed += 1;
            }

            // Decide, while only holding shared borrows, which routes run this
            // tick and with which regrouped mempool slice.
            let mut dispatch: HashMap<usize, HashMap<PoolKey, Vec<DecodedTx>>> = HashMap::new();
            for (i, slot) in self.routes.iter().enumerate() {
                let matched = matches.remove(&slot.filter_key);
                let has_pending_transition =
                    slot.engine.state() != EngineState::ReadyToPlan || height > slot.engine.last_run_height();
                match matched {
                    Some(txs) if !txs.is_empty() => {
                        dispatch.insert(i, route_mempool(&slot.candidate_pools, &txs));
                    }
                    _ if has_pending_transition => {
                        dispatch.insert(i, HashMap::new());
                    }
                    _ => {}
                }
            }

            // `iter_mut()` yields disjoint `&mut RouteSlot`s, so each
            // dispatched route's future can run concurrently without the
            // driver needing to move engines in and out of the slots.
            let futures: Vec<_> = self
                .routes
                .iter_mut()
                .enumerate()
                .filter_map(|(i, slot)| {
                    let filtered = dispatch.remove(&i)?;
                    Some(async move {
                        let result = slot.engine.run(height, &filtered).await;
                        (i, result)
                    })
                })
                .collect();

            for (i, result) in futures::future::join_all(futures).await {
                if let Err(e) = result {
                    debug!(route = i, height, error = %e, "route run produced an error");
                }
            }

            self.resolve_pool_conflicts();

            if let Some(max) = self.max_n_blocks {
                if blocks_processed >= max {
                    info!(blocks_processed, "strategy driver reached max_n_blocks, stopping");
                    return Ok(());
                }
            }
        }
    }

    /// §4.10 step 4: when more than one route is sitting in `ReadyToBroadcast`
    /// with overlapping pools, keep only the one with the largest estimated
    /// net profit and reset the others back to `ReadyToPlan`. Overlap can be
    /// transitive across more than two routes, so conflicting routes are
    /// grouped with a small union-find rather than compared pairwise.
    fn resolve_pool_conflicts(&mut self) {
        let n = self.routes.len();
        let mut parent: Vec<usize> = (0..n).collect();

        fn find(parent: &mut [usize], x: usize) -> usize {
            if parent[x] != x {
                parent[x] = find(parent, parent[x]);
            }
            parent[x]
        }

        let ready: Vec<usize> =
            (0..n).filter(|&i| self.routes[i].engine.state() == EngineState::ReadyToBroadcast).collect();

        for &a in &ready {
            for &b in &ready {
                if a >= b {
                    continue;
                }
                let pools_a = self.routes[a].engine.planned_pools();
                let pools_b = self.routes[b].engine.planned_pools();
                if pools_a.iter().any(|p| pools_b.contains(p)) {
                    let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                    if ra != rb {
                        parent[ra] = rb;
                    }
                }
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for &i in &ready {
            let root = find(&mut parent, i);
            groups.entry(root).or_default().push(i);
        }

        for members in groups.into_values() {
            if members.len() < 2 {
                continue;
            }
            let winner = members
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    let pa = self.routes[a].engine.est_net_profit().unwrap_or_default();
                    let pb = self.routes[b].engine.est_net_profit().unwrap_or_default();
                    pa.cmp(&pb)
                })
                .expect("members is non-empty");
            for i in members {
                if i != winner {
                    warn!(route = i, winner, "pool conflict: resetting route in favor of higher-profit sibling");
                    self.routes[i].engine.reset();
                }
            }
        }
    }
}

/// Splits one route's matched transactions by which of its candidate pools
/// they touch, the shape [`RouteEngine::run`] expects.
fn route_mempool(candidate_pools: &[PoolKey], matched: &[DecodedTx]) -> HashMap<PoolKey, Vec<DecodedTx>> {
    let mut grouped: HashMap<PoolKey, Vec<DecodedTx>> = HashMap::new();
    for tx in matched {
        for pool in tx.msgs.iter().flat_map(|m| m.touched_pools()) {
            if candidate_pools.contains(&pool) {
                grouped.entry(pool).or_default().push(tx.clone());
            }
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{RouteEngineConfig, TxInfoQuery};
    use crate::fee::{BroadcastOutcome, FeeManager, NodeClient, SignerState, SimulateOutcome};
    use crate::mempool::types::CosmosMsg;
    use crate::pool::registry::PoolRegistry;
    use crate::pool::{ConstantProductPool, Pool};
    use crate::route::Route;
    use crate::token::{Token, TokenAmount};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn ust() -> Token {
        Token::native("uusd", "UST", 6)
    }
    fn luna() -> Token {
        Token::native("uluna", "LUNA", 6)
    }
    fn p1() -> PoolKey {
        PoolKey::new("columbus-5", "pair1")
    }
    fn p2() -> PoolKey {
        PoolKey::new("columbus-5", "pair2")
    }

    #[test]
    fn route_mempool_keeps_only_this_routes_pools() {
        let tx_p1 = DecodedTx {
            raw: "a".into(),
            msgs: vec![CosmosMsg::ContractSwap { pool: p1(), offer: TokenAmount::new(ust(), dec!(10)), belief_price: None, max_spread: None }],
        };
        let tx_p2 = DecodedTx {
            raw: "b".into(),
            msgs: vec![CosmosMsg::ContractSwap { pool: p2(), offer: TokenAmount::new(ust(), dec!(10)), belief_price: None, max_spread: None }],
        };

        let grouped = route_mempool(&[p1()], &[tx_p1, tx_p2]);
        assert_eq!(grouped.len(), 1);
        assert!(grouped.contains_key(&p1()));
    }

    struct AlwaysOkNode;
    #[async_trait]
    impl NodeClient for AlwaysOkNode {
        async fn simulate(&self, _messages: &[String], _sequence: u64) -> SimulateOutcome {
            SimulateOutcome::Ok { gas_used: 200_000 }
        }
        async fn broadcast(&self, _messages: &[String], _fee: &TokenAmount, sequence: u64) -> BroadcastOutcome {
            BroadcastOutcome::Ok { tx_hash: format!("TX{sequence}") }
        }
        async fn own_tx_in_mempool(&self, _sequence: u64) -> bool {
            false
        }
    }

    struct NeverConfirms;
    #[async_trait]
    impl crate::arbitrage::TxInfoClient for NeverConfirms {
        async fn tx_info(&self, _tx_hash: &str) -> TxInfoQuery {
            TxInfoQuery::NotFound
        }
    }

    fn config() -> RouteEngineConfig {
        RouteEngineConfig {
            min_profit_ref: dec!(-1000000),
            max_single_trade_amount: dec!(1000000),
            n_repeat_max: 1,
            seed_amount: dec!(10),
            optimizer_dx: dec!(1),
            safety_bips: 0,
            gas_price: dec!(0.15),
        }
    }

    /// Single-pool two-token route whose planned attempt always touches
    /// `key`, used so conflict resolution has something concrete to collide
    /// on.
    async fn planned_engine(key: PoolKey, reserves: [Decimal; 2]) -> RouteEngine {
        let route = Route::new(vec![ust(), luna()], vec![key.clone()]);
        let registry = Arc::new(PoolRegistry::new());
        registry
            .get_or_build(&key, || async move { Ok(Pool::ConstantProduct(ConstantProductPool::new(key, [ust(), luna()], reserves))) })
            .await
            .ok();
        let fee_manager = Arc::new(FeeManager::new(Arc::new(AlwaysOkNode), Arc::new(SignerState::new(1)), ust(), dec!(1.4), dec!(0.15), true));
        let mut engine = RouteEngine::new(vec![route], config(), registry, fee_manager, Arc::new(NeverConfirms));
        engine.run(1, &HashMap::new()).await.unwrap();
        assert_eq!(engine.state(), EngineState::ReadyToBroadcast);
        engine
    }

    #[tokio::test]
    async fn conflict_resolution_keeps_the_higher_profit_route() {
        let key = p1();
        let cheap = planned_engine(key.clone(), [dec!(1000000), dec!(1000000)]).await;
        let rich = planned_engine(key, [dec!(1000000), dec!(5000000)]).await;

        let cheap_profit = cheap.est_net_profit().unwrap();
        let rich_profit = rich.est_net_profit().unwrap();
        assert!(rich_profit > cheap_profit, "test fixture should produce a clear profit gap");

        let watcher = MempoolWatcher::new("http://127.0.0.1:1", "columbus-5", crate::mempool::watcher::HeightTracker::new()).unwrap();
        let mut driver = StrategyDriver::new(vec![cheap, rich], watcher, None, None);

        driver.resolve_pool_conflicts();

        assert_eq!(driver.routes[0].engine.state(), EngineState::ReadyToPlan);
        assert_eq!(driver.routes[1].engine.state(), EngineState::ReadyToBroadcast);
    }
}
