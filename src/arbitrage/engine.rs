//! Per-route arbitrage engine (§4.8): drives one `MultiRoute`'s materialized
//! candidates through `ReadyToPlan -> ReadyToBroadcast -> WaitingConfirmation
//! -> Finished -> ReadyToPlan`, one transition per `run()` call.
//!
//! Grounded on `original_source/src/arbitrage/cosmos/repeated_tx_arbitrage.py`
//! (`RepeatedTxArbitrage.run`'s height-guarded broadcast and confirmation
//! polling) and `original_source/src/arbitrage/base.py` (`_get_params_single_route`,
//! the per-candidate optimizer + fee-estimate + profit comparison).

use super::reserve_sim;
use super::state::{derive_state, EngineState};
use crate::error::ArbError;
use crate::fee::{EstimatedFee, FeeManager};
use crate::mempool::types::DecodedTx;
use crate::optimizer;
use crate::pool::registry::{PoolRegistry, ReserveSimulationScope};
use crate::pool::PoolKey;
use crate::route::Route;
use crate::token::TokenAmount;
use crate::types::{ArbParams, ArbResult, ArbTx, ArbitrageData, TxStatus};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Constants from §4.8, grounded in the same file.
const MAX_BLOCK_BROADCAST_DELAY: u64 = 1;
const MIN_CONFIRMATIONS: u64 = 1;
const MAX_BLOCKS_WAIT_RECEIPT: u64 = 4;

#[derive(Debug, Clone)]
pub struct RouteEngineConfig {
    pub min_profit_ref: Decimal,
    pub max_single_trade_amount: Decimal,
    pub n_repeat_max: u32,
    /// Seed input used both for `should_reverse` and as the optimizer's
    /// starting point.
    pub seed_amount: Decimal,
    pub optimizer_dx: Decimal,
    pub safety_bips: u32,
    /// Reference gas price, used only to translate confirmed `gas_used`
    /// into a realized cost for logging/`ArbResult::gas_cost`.
    pub gas_price: Decimal,
}

/// Outcome of querying a broadcasted tx's on-chain status (§4.8
/// WaitingConfirmation). Transport itself is out of scope (§1); this is the
/// seam the engine drives.
#[async_trait]
pub trait TxInfoClient: Send + Sync {
    async fn tx_info(&self, tx_hash: &str) -> TxInfoQuery;
}

#[derive(Debug, Clone)]
pub enum TxInfoQuery {
    NotFound,
    Confirmed {
        height: u64,
        gas_used: u64,
        /// `Some(rawlog)` marks an on-chain failure; `None` is success.
        failure_raw_log: Option<String>,
        final_amount: Option<TokenAmount>,
    },
}

/// Drives one logical route (a `MultiRoute`'s materialized candidates)
/// through its lifecycle. Holds no chain I/O itself beyond what
/// `PoolRegistry`/`FeeManager`/`TxInfoClient` expose.
pub struct RouteEngine {
    candidates: Vec<Route>,
    config: RouteEngineConfig,
    registry: Arc<PoolRegistry>,
    fee_manager: Arc<FeeManager>,
    tx_info_client: Arc<dyn TxInfoClient>,
    data: ArbitrageData,
    last_run_height: u64,
}

impl RouteEngine {
    pub fn new(
        candidates: Vec<Route>,
        config: RouteEngineConfig,
        registry: Arc<PoolRegistry>,
        fee_manager: Arc<FeeManager>,
        tx_info_client: Arc<dyn TxInfoClient>,
    ) -> Self {
        Self { candidates, config, registry, fee_manager, tx_info_client, data: ArbitrageData::default(), last_run_height: 0 }
    }

    pub fn state(&self) -> EngineState {
        derive_state(&self.data)
    }

    pub fn last_run_height(&self) -> u64 {
        self.last_run_height
    }

    pub fn data(&self) -> &ArbitrageData {
        &self.data
    }

    /// Net profit of the currently planned (not yet broadcast) attempt, if
    /// any — used by the strategy driver to pick a winner among routes
    /// contending for the same pool (§4.10 step 4).
    pub fn est_net_profit(&self) -> Option<Decimal> {
        self.data.params.as_ref().map(|p| p.estimated_net_profit)
    }

    /// Pool identities touched by the currently planned attempt's route,
    /// used by the strategy driver's conflict check.
    pub fn planned_pools(&self) -> Vec<PoolKey> {
        match &self.data.params {
            Some(params) => self.candidates.get(params.route_index).map(|r| r.pool_keys.clone()).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// Every pool any candidate of this route could touch, used by the
    /// strategy driver to build this route's mempool filter and to scope
    /// which matched transactions belong to it.
    pub fn candidate_pools(&self) -> Vec<PoolKey> {
        let mut pools: Vec<PoolKey> = self.candidates.iter().flat_map(|r| r.pool_keys.clone()).collect();
        pools.sort();
        pools.dedup();
        pools
    }

    /// Drops any in-flight plan, returning to `ReadyToPlan` without
    /// broadcasting. Used when a sibling route wins a shared-pool conflict.
    pub fn reset(&mut self) {
        self.data.reset();
    }

    /// Exactly one state transition. `last_run_height` is updated
    /// regardless of the outcome, matching `RepeatedTxArbitrage.run()`'s
    /// `finally`-equivalent height bookkeeping.
    pub async fn run(&mut self, height: u64, filtered_mempool: &HashMap<PoolKey, Vec<DecodedTx>>) -> Result<(), ArbError> {
        let result = self.run_inner(height, filtered_mempool).await;
        self.last_run_height = height;
        result
    }

    async fn run_inner(&mut self, height: u64, filtered_mempool: &HashMap<PoolKey, Vec<DecodedTx>>) -> Result<(), ArbError> {
        match derive_state(&self.data) {
            EngineState::ReadyToPlan => self.plan(height, filtered_mempool).await,
            EngineState::ReadyToBroadcast => self.broadcast_stage(height).await,
            EngineState::WaitingConfirmation => self.confirm_stage(height).await,
            EngineState::Finished => {
                self.data.reset();
                Ok(())
            }
        }
    }

    async fn plan(&mut self, height: u64, filtered_mempool: &HashMap<PoolKey, Vec<DecodedTx>>) -> Result<(), ArbError> {
        let overlay = reserve_sim::build_overlay(&self.registry, filtered_mempool).await?;

        let registry = self.registry.clone();
        let fee_manager = self.fee_manager.clone();
        let config = self.config.clone();
        let candidates = self.candidates.clone();

        let best: Result<Option<ArbParams>, ArbError> = ReserveSimulationScope::run(overlay, move || async move {
            let mut best: Option<ArbParams> = None;
            for (route_index, route) in candidates.iter().enumerate() {
                match plan_single_route(route_index, route, height, &registry, &fee_manager, &config).await {
                    Ok(params) => {
                        if best.as_ref().map_or(true, |b| params.estimated_net_profit > b.estimated_net_profit) {
                            best = Some(params);
                        }
                    }
                    Err(ArbError::OptimizationError { .. }) | Err(ArbError::InsufficientLiquidity { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(best)
        })
        .await;

        match best? {
            Some(params) if params.estimated_net_profit >= self.config.min_profit_ref => {
                self.data.params = Some(params);
                Ok(())
            }
            Some(params) => Err(ArbError::UnprofitableArbitrage {
                net_profit: params.estimated_net_profit.to_string(),
                min_profit: self.config.min_profit_ref.to_string(),
            }),
            None => Err(ArbError::UnprofitableArbitrage {
                net_profit: "none".to_string(),
                min_profit: self.config.min_profit_ref.to_string(),
            }),
        }
    }

    async fn broadcast_stage(&mut self, height: u64) -> Result<(), ArbError> {
        let params = self.data.params.clone().expect("ReadyToBroadcast implies params is set");

        if height > params.block_height_found + MAX_BLOCK_BROADCAST_DELAY {
            self.data.reset();
            return Err(ArbError::BlockchainNewState { planned: params.block_height_found, current: height });
        }

        let fee = EstimatedFee { gas: 0, amount: params.estimated_fee.clone() };
        let mut txs = Vec::with_capacity(params.n_repeat as usize);
        for _ in 0..params.n_repeat {
            match self.fee_manager.broadcast(&params.messages, &fee).await {
                Ok(tx_hash) => txs.push(ArbTx { timestamp_sent: Utc::now(), tx_hash }),
                Err(ArbError::TxAlreadyBroadcasted) => {
                    self.data.reset();
                    return Err(ArbError::TxAlreadyBroadcasted);
                }
                Err(e) => return Err(e),
            }
        }
        self.data.txs = txs;
        Ok(())
    }

    async fn confirm_stage(&mut self, height: u64) -> Result<(), ArbError> {
        let params = self.data.params.clone().expect("WaitingConfirmation implies params is set");
        let mut results = Vec::with_capacity(self.data.txs.len());
        let mut any_busy = false;

        for tx in &self.data.txs {
            match self.tx_info_client.tx_info(&tx.tx_hash).await {
                TxInfoQuery::NotFound => {
                    let delay = height.saturating_sub(params.block_height_found);
                    if delay < MAX_BLOCKS_WAIT_RECEIPT {
                        any_busy = true;
                    } else {
                        results.push(ArbResult::not_found());
                    }
                }
                TxInfoQuery::Confirmed { height: confirmed_height, gas_used, failure_raw_log, final_amount } => {
                    let confirmations = height.saturating_sub(confirmed_height);
                    if confirmations < MIN_CONFIRMATIONS {
                        any_busy = true;
                    } else if let Some(raw_log) = failure_raw_log {
                        let gas_cost = Decimal::from(gas_used) * self.config.gas_price;
                        results.push(ArbResult::failed(raw_log, gas_cost));
                    } else {
                        let net_profit_ref = final_amount.as_ref().map(|a| a.amount - params.input_amount.amount);
                        results.push(ArbResult {
                            tx_status: TxStatus::Succeeded,
                            err_log: None,
                            gas_used: Some(gas_used),
                            gas_cost: Some(Decimal::from(gas_used) * self.config.gas_price),
                            inclusion_delay: Some(confirmations),
                            timestamp_received: Some(Utc::now()),
                            block_received: Some(confirmed_height),
                            final_amount,
                            net_profit_ref,
                        });
                    }
                }
            }
        }

        if any_busy {
            return Err(ArbError::IsBusy);
        }

        let succeeded = results.iter().filter(|r| r.tx_status == TxStatus::Succeeded).count();
        let failed = results.len() - succeeded;
        let total_net_profit: Decimal = results.iter().filter_map(|r| r.net_profit_ref).sum();
        info!(route_index = params.route_index, succeeded, failed, %total_net_profit, "arbitrage route finished");

        self.data.results = results;
        self.data.reset();
        Ok(())
    }
}

/// `_get_params_single_route`: sizes and prices one candidate route.
/// `messages`/`n_repeat` split the optimizer's total optimal input across
/// `n_repeat` identical broadcast copies; `estimated_output`/`estimated_net_profit`
/// reflect the full (unsplit) trade.
async fn plan_single_route(
    route_index: usize,
    route: &Route,
    height: u64,
    registry: &PoolRegistry,
    fee_manager: &FeeManager,
    config: &RouteEngineConfig,
) -> Result<ArbParams, ArbError> {
    let lookup = |k: &PoolKey| registry.peek(k);

    let reverse = if route.is_cycle() {
        let seed = TokenAmount::new(route.tokens[0].clone(), config.seed_amount);
        route.should_reverse(&seed, lookup)?
    } else {
        false
    };

    let start_token = if reverse { route.tokens.last().unwrap().clone() } else { route.tokens[0].clone() };
    let end_token = if reverse { route.tokens[0].clone() } else { route.tokens.last().unwrap().clone() };

    let curve = |x: Decimal| -> Result<Decimal, ArbError> {
        let input = TokenAmount::new(start_token.clone(), x);
        let out = route.quote(&input, reverse, 0, lookup)?;
        Ok(out.amount - x)
    };
    let optimal_input = optimizer::maximize(&curve, config.seed_amount, config.optimizer_dx, optimizer::default_tolerance())?;
    if optimal_input <= Decimal::ZERO {
        return Err(ArbError::OptimizationError { reason: "optimal input is non-positive".to_string() });
    }

    let full_input = TokenAmount::new(start_token.clone(), optimal_input);
    let estimated_output = route.quote(&full_input, reverse, config.safety_bips, lookup)?;

    let n_repeat: u32 = {
        let ratio = (optimal_input / config.max_single_trade_amount).ceil();
        let n: u32 = ratio.to_string().parse().unwrap_or(config.n_repeat_max).max(1);
        n.min(config.n_repeat_max)
    };
    let per_repeat_amount = optimal_input / Decimal::from(n_repeat);
    let per_repeat_input = TokenAmount::new(start_token, per_repeat_amount);
    let min_out = TokenAmount::zero(end_token);
    let (_per_copy_output, pool_msgs) = route.build_ops(&per_repeat_input, reverse, &min_out, lookup)?;
    let messages: Vec<String> = pool_msgs.into_iter().map(|m| m.description).collect();

    let fee = fee_manager.estimate_fee(&messages).await?;
    let net_profit = if fee.amount.token == full_input.token {
        estimated_output.amount - full_input.amount - fee.amount.amount
    } else {
        estimated_output.amount - full_input.amount
    };

    Ok(ArbParams {
        timestamp: Utc::now(),
        block_height_found: height,
        route_index,
        reverse,
        input_amount: full_input,
        messages,
        n_repeat,
        estimated_output,
        estimated_fee: fee.amount,
        estimated_net_profit: net_profit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::{BroadcastOutcome, NodeClient, SignerState, SimulateOutcome};
    use crate::pool::{ConstantProductPool, Pool};
    use crate::token::Token;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    fn ust() -> Token {
        Token::native("uusd", "UST", 6)
    }
    fn luna() -> Token {
        Token::native("uluna", "LUNA", 6)
    }

    fn p1_key() -> PoolKey {
        PoolKey::new("columbus-5", "pair1")
    }
    fn p2_key() -> PoolKey {
        PoolKey::new("columbus-5", "pair2")
    }

    struct AlwaysOkNode;
    #[async_trait]
    impl NodeClient for AlwaysOkNode {
        async fn simulate(&self, _messages: &[String], _sequence: u64) -> SimulateOutcome {
            SimulateOutcome::Ok { gas_used: 200_000 }
        }
        async fn broadcast(&self, _messages: &[String], _fee: &TokenAmount, _sequence: u64) -> BroadcastOutcome {
            BroadcastOutcome::Ok { tx_hash: format!("TX{}", _sequence) }
        }
        async fn own_tx_in_mempool(&self, _sequence: u64) -> bool {
            false
        }
    }

    struct ScriptedTxInfo(Mutex<Vec<TxInfoQuery>>);
    #[async_trait]
    impl TxInfoClient for ScriptedTxInfo {
        async fn tx_info(&self, _tx_hash: &str) -> TxInfoQuery {
            self.0.lock().unwrap().remove(0)
        }
    }

    async fn build_registry() -> Arc<PoolRegistry> {
        let registry = Arc::new(PoolRegistry::new());
        registry
            .get_or_build(&p1_key(), || async {
                Ok(Pool::ConstantProduct(ConstantProductPool::new(p1_key(), [ust(), luna()], [dec!(1000000), dec!(2000000)])))
            })
            .await
            .unwrap();
        registry
            .get_or_build(&p2_key(), || async {
                Ok(Pool::ConstantProduct(ConstantProductPool::new(p2_key(), [luna(), ust()], [dec!(2100000), dec!(1100000)])))
            })
            .await
            .unwrap();
        registry
    }

    fn cycle_route() -> Route {
        Route::new(vec![ust(), luna(), ust()], vec![p1_key(), p2_key()])
    }

    fn config() -> RouteEngineConfig {
        RouteEngineConfig {
            min_profit_ref: dec!(0),
            max_single_trade_amount: dec!(1000000),
            n_repeat_max: 3,
            seed_amount: dec!(10),
            optimizer_dx: dec!(1),
            safety_bips: 0,
            gas_price: dec!(0.15),
        }
    }

    #[tokio::test]
    async fn plans_then_broadcasts_then_confirms_full_cycle() {
        let registry = build_registry().await;
        let fee_manager = Arc::new(FeeManager::new(
            Arc::new(AlwaysOkNode),
            Arc::new(SignerState::new(1)),
            ust(),
            dec!(1.4),
            dec!(0.15),
            true,
        ));
        let tx_info = Arc::new(ScriptedTxInfo(Mutex::new(vec![
            TxInfoQuery::NotFound,
            TxInfoQuery::Confirmed { height: 100, gas_used: 150_000, failure_raw_log: None, final_amount: Some(TokenAmount::new(ust(), dec!(105))) },
        ])));

        let mut engine = RouteEngine::new(vec![cycle_route()], config(), registry, fee_manager, tx_info);
        assert_eq!(engine.state(), EngineState::ReadyToPlan);

        engine.run(100, &HashMap::new()).await.unwrap();
        assert_eq!(engine.state(), EngineState::ReadyToBroadcast);
        assert_eq!(engine.last_run_height(), 100);

        engine.run(100, &HashMap::new()).await.unwrap();
        assert_eq!(engine.state(), EngineState::WaitingConfirmation);

        // height 100: confirm() sees NotFound but delay (0) < MAX_BLOCKS_WAIT_RECEIPT, busy.
        let err = engine.run(100, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ArbError::IsBusy));
        assert_eq!(engine.state(), EngineState::WaitingConfirmation);

        // next call pops the Confirmed outcome; same min-confirmations check (0 diff) passes.
        engine.run(101, &HashMap::new()).await.unwrap();
        assert_eq!(engine.state(), EngineState::ReadyToPlan);
        assert!(!engine.data().results.is_empty());
    }

    #[tokio::test]
    async fn stale_broadcast_height_resets_to_ready_to_plan() {
        let registry = build_registry().await;
        let fee_manager = Arc::new(FeeManager::new(Arc::new(AlwaysOkNode), Arc::new(SignerState::new(1)), ust(), dec!(1.4), dec!(0.15), true));
        let tx_info = Arc::new(ScriptedTxInfo(Mutex::new(vec![])));
        let mut engine = RouteEngine::new(vec![cycle_route()], config(), registry, fee_manager, tx_info);

        engine.run(100, &HashMap::new()).await.unwrap();
        assert_eq!(engine.state(), EngineState::ReadyToBroadcast);

        let err = engine.run(105, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ArbError::BlockchainNewState { .. }));
        assert_eq!(engine.state(), EngineState::ReadyToPlan);
    }
}
