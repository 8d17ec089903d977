//! Pool instance cache with singleton-with-concurrent-construction
//! semantics, plus the task-local simulation overlay used while planning a
//! route inside a reserve-simulation scope.
//!
//! Grounded on `terraswap/liquidity_pair.py::LiquidityPair.new` (a one-shot
//! construction latch shared by concurrent callers, with the failure cached
//! and rethrown rather than retried) and `pool/state.rs`'s `DashMap`-backed
//! shared state.

use crate::error::ArbError;
use crate::pool::{Pool, PoolKey};
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task_local;

type BuildResult = Result<Pool, Arc<ArbError>>;

/// `GetOrBuild<K, V>`: first caller for a given key runs the async builder
/// and every concurrent caller awaits the same result; on failure, the
/// error is cached and returned to all callers without retrying.
pub struct PoolRegistry {
    pools: DashMap<PoolKey, Arc<OnceCell<BuildResult>>>,
}

// `tokio::sync::OnceCell::get_or_try_init` takes an async initializer and
// lets every concurrent caller await the same in-flight future — the
// async-aware latch the original's `asyncio.Event`-based singleton needed.

impl PoolRegistry {
    pub fn new() -> Self {
        Self { pools: DashMap::new() }
    }

    /// Returns the cached pool for `key`, constructing it at most once. The
    /// task-local simulation overlay (see [`ReserveSimulationScope`]) is
    /// consulted first, so planning code sees forked reserves transparently.
    pub async fn get_or_build<F, Fut>(&self, key: &PoolKey, builder: F) -> Result<Pool, Arc<ArbError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Pool, ArbError>>,
    {
        if let Some(overlay) = SIMULATION_OVERLAY.try_with(|o| o.clone()).ok().flatten() {
            if let Some(pool) = overlay.get(key) {
                return Ok(pool.clone());
            }
        }

        let cell = self
            .pools
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async { builder().await.map_err(Arc::new) })
            .await
            .cloned()
    }

    /// Returns a pool only if it has already been constructed; used by code
    /// paths (quoting inside an established route) that must not trigger a
    /// fresh on-chain fetch.
    pub fn peek(&self, key: &PoolKey) -> Option<Pool> {
        if let Some(overlay) = SIMULATION_OVERLAY.try_with(|o| o.clone()).ok().flatten() {
            if let Some(pool) = overlay.get(key) {
                return Some(pool.clone());
            }
        }
        self.pools.get(key)?.get().and_then(|r| r.as_ref().ok().cloned())
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

task_local! {
    /// `Some(overlay)` while a [`ReserveSimulationScope`] is active on this
    /// task; consulted by `PoolRegistry::get_or_build`/`peek` ahead of the
    /// real cache so simulated forks are invisible to other concurrent
    /// routes (each has its own task and its own task-local value).
    static SIMULATION_OVERLAY: Option<Arc<HashMap<PoolKey, Pool>>>;
}

/// RAII guard installing a set of simulated pool forks for the duration of
/// one `ReadyToPlan` run. Entered at the start of planning, restored via
/// `Drop` on every exit path including early return and panic unwind —
/// the Rust analogue of the original's `@asynccontextmanager`.
///
/// Because `tokio::task_local!` values are per-task, this only has to
/// install the overlay into the *current* task; it intentionally does not
/// attempt to mutate shared state, so concurrent routes running in sibling
/// tasks never observe each other's simulation.
pub struct ReserveSimulationScope;

impl ReserveSimulationScope {
    /// Runs `body` with `overlay` visible to every `PoolRegistry` lookup
    /// made from within it on this task.
    pub async fn run<F, Fut, T>(overlay: HashMap<PoolKey, Pool>, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        SIMULATION_OVERLAY.scope(Some(Arc::new(overlay)), body()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{ConstantProductPool, PoolOps};
    use crate::token::{Token, TokenAmount};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key() -> PoolKey {
        PoolKey::new("columbus-5", "terra1pair")
    }

    fn build_pool() -> Pool {
        let ust = Token::native("uusd", "UST", 6);
        let luna = Token::native("uluna", "LUNA", 6);
        Pool::ConstantProduct(ConstantProductPool::new(key(), [ust, luna], [dec!(1000000), dec!(2000000)]))
    }

    #[tokio::test]
    async fn concurrent_builders_run_exactly_once() {
        let registry = Arc::new(PoolRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .get_or_build(&key(), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move { Ok(build_pool()) }
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn simulation_scope_overlays_and_restores() {
        let registry = PoolRegistry::new();
        registry
            .get_or_build(&key(), || async move { Ok(build_pool()) })
            .await
            .unwrap();

        let forked = build_pool();
        let forked = match forked {
            Pool::ConstantProduct(p) => Pool::ConstantProduct(
                p.simulate_reserve_change(&[TokenAmount::new(Token::native("uusd", "UST", 6), dec!(5000))])
                    .map(|pool| match pool {
                        Pool::ConstantProduct(inner) => inner,
                        _ => unreachable!(),
                    })
                    .unwrap(),
            ),
            other => other,
        };

        let mut overlay = HashMap::new();
        overlay.insert(key(), forked);

        ReserveSimulationScope::run(overlay, || async {
            let seen = registry.peek(&key()).unwrap();
            assert!(seen.get_reserves()[0].amount > dec!(1000000));
        })
        .await;

        // overlay gone outside the scope
        let seen_after = registry.peek(&key()).unwrap();
        assert_eq!(seen_after.get_reserves()[0].amount, dec!(1000000));
    }
}
