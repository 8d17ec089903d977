//! Fee estimation and signer-sequence management (§4.7).
//!
//! Grounded on `original_source/src/chains/cosmos/client/api_tx.py`
//! (`estimate_fee`/`broadcast`'s sequence-mismatch retry loop). The actual
//! gas-simulation and broadcast RPCs are out of scope (§1, "chain-RPC
//! transport"); this module owns the retry/fallback policy around them and
//! is exercised here against a `NodeClient` trait object so the policy is
//! testable without a live chain.

use crate::error::ArbError;
use crate::token::TokenAmount;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const MAX_FEE_ESTIMATION_TRIES: u32 = 5;
const MAX_BROADCAST_TRIES: u32 = 10;
/// Conservative fallback gas-adjustment bump added on top of the
/// configured `gas_adjustment` when the simulation RPC itself fails.
const FALLBACK_GAS_ADJUSTMENT_BUMP: &str = "0.20";

/// Outcome of a gas-simulation RPC call.
#[derive(Debug, Clone)]
pub enum SimulateOutcome {
    Ok { gas_used: u64 },
    /// `account sequence mismatch, expected K`.
    SequenceMismatch { expected: u64 },
    /// Anything else (node error, timeout, malformed response).
    Other(String),
}

/// Outcome of a broadcast RPC call.
#[derive(Debug, Clone)]
pub enum BroadcastOutcome {
    Ok { tx_hash: String },
    SequenceMismatch { expected: u64 },
    Other(String),
}

/// The external collaborator this module drives: a node client capable of
/// dry-run gas simulation, broadcasting, and telling us whether our own
/// prior tx is already sitting in the mempool (used to detect "actually
/// already broadcast, the mismatch was just a race" vs a genuine retry).
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn simulate(&self, messages: &[String], sequence: u64) -> SimulateOutcome;
    async fn broadcast(&self, messages: &[String], fee: &TokenAmount, sequence: u64) -> BroadcastOutcome;
    /// True if a transaction signed with `sequence` is already visible in
    /// the local mempool — used to distinguish a stale mismatch from a
    /// transaction that in fact went through.
    async fn own_tx_in_mempool(&self, sequence: u64) -> bool;
}

/// Single-owner signer sequence (§5 "Shared-resource policy"): mutated only
/// by the broadcast path, resynchronized from an `account sequence
/// mismatch, expected K` error rather than guessed ahead of time.
pub struct SignerState {
    sequence: AtomicU64,
}

impl SignerState {
    pub fn new(initial_sequence: u64) -> Self {
        Self { sequence: AtomicU64::new(initial_sequence) }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    fn set(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::Release);
    }

    fn increment(&self) {
        self.sequence.fetch_add(1, Ordering::AcqRel);
    }
}

/// A sized, ready-to-broadcast fee.
#[derive(Debug, Clone)]
pub struct EstimatedFee {
    pub gas: u64,
    pub amount: TokenAmount,
}

/// Drives `estimate_fee`/`broadcast` against a `NodeClient`, owning the
/// signer-sequence retry policy described in §4.7.
pub struct FeeManager {
    client: Arc<dyn NodeClient>,
    signer: Arc<SignerState>,
    fee_denom: crate::token::Token,
    gas_adjustment: Decimal,
    gas_price: Decimal,
    use_fallback_estimate: bool,
}

impl FeeManager {
    pub fn new(
        client: Arc<dyn NodeClient>,
        signer: Arc<SignerState>,
        fee_denom: crate::token::Token,
        gas_adjustment: Decimal,
        gas_price: Decimal,
        use_fallback_estimate: bool,
    ) -> Self {
        Self { client, signer, fee_denom, gas_adjustment, gas_price, use_fallback_estimate }
    }

    /// `estimate_fee`: simulate gas via the node, retrying on a sequence
    /// mismatch up to `MAX_FEE_ESTIMATION_TRIES`; fall back to a
    /// conservative fixed estimate on other failures when configured to.
    pub async fn estimate_fee(&self, messages: &[String]) -> Result<EstimatedFee, ArbError> {
        for attempt in 0..MAX_FEE_ESTIMATION_TRIES {
            let sequence = self.signer.sequence();
            match self.client.simulate(messages, sequence).await {
                SimulateOutcome::Ok { gas_used } => {
                    let gas = ceil_mul(gas_used, self.gas_adjustment);
                    let amount = fee_amount(&self.fee_denom, gas, self.gas_price);
                    return Ok(EstimatedFee { gas, amount });
                }
                SimulateOutcome::SequenceMismatch { expected } => {
                    if self.client.own_tx_in_mempool(sequence).await {
                        return Err(ArbError::TxAlreadyBroadcasted);
                    }
                    warn!(attempt, sequence, expected, "fee estimation: sequence mismatch, retrying");
                    self.signer.set(expected);
                }
                SimulateOutcome::Other(reason) => {
                    if self.use_fallback_estimate {
                        return Ok(self.fallback_fee(messages));
                    }
                    return Err(ArbError::FeeEstimationError { reason });
                }
            }
        }
        Err(ArbError::FeeEstimationError { reason: "exhausted sequence-mismatch retries".to_string() })
    }

    /// Conservative fee used when gas simulation itself failed and
    /// `use_fallback_estimate` is set: `gas_adjustment + 0.20`, applied to
    /// a per-message flat gas estimate (no live simulation to consult).
    fn fallback_fee(&self, messages: &[String]) -> EstimatedFee {
        const FLAT_GAS_PER_MSG: u64 = 250_000;
        let estimated_gas_use = FLAT_GAS_PER_MSG * messages.len().max(1) as u64;
        let bump = Decimal::from_str_exact(FALLBACK_GAS_ADJUSTMENT_BUMP).unwrap();
        let gas = ceil_mul(estimated_gas_use, self.gas_adjustment + bump);
        let amount = fee_amount(&self.fee_denom, gas, self.gas_price);
        EstimatedFee { gas, amount }
    }

    /// `broadcast`: sign with the current sequence and submit. On a
    /// sequence mismatch, re-check the mempool for our own prior tx before
    /// retrying, up to `MAX_BROADCAST_TRIES`. On success, bumps the local
    /// sequence by one.
    pub async fn broadcast(&self, messages: &[String], fee: &EstimatedFee) -> Result<String, ArbError> {
        for attempt in 0..MAX_BROADCAST_TRIES {
            let sequence = self.signer.sequence();
            match self.client.broadcast(messages, &fee.amount, sequence).await {
                BroadcastOutcome::Ok { tx_hash } => {
                    self.signer.increment();
                    info!(tx_hash = %tx_hash, sequence, "broadcast succeeded");
                    return Ok(tx_hash);
                }
                BroadcastOutcome::SequenceMismatch { expected } => {
                    if self.client.own_tx_in_mempool(sequence).await {
                        return Err(ArbError::TxAlreadyBroadcasted);
                    }
                    warn!(attempt, sequence, expected, "broadcast: sequence mismatch, retrying");
                    self.signer.set(expected);
                }
                BroadcastOutcome::Other(reason) => {
                    return Err(ArbError::Transport(reason));
                }
            }
        }
        Err(ArbError::Transport("exhausted broadcast sequence-mismatch retries".to_string()))
    }
}

fn ceil_mul(gas_used: u64, factor: Decimal) -> u64 {
    let scaled = Decimal::from(gas_used) * factor;
    scaled.ceil().to_string().parse::<u64>().unwrap_or(gas_used)
}

fn fee_amount(denom: &crate::token::Token, gas: u64, gas_price: Decimal) -> TokenAmount {
    let raw = Decimal::from(gas) * gas_price;
    // fee coins are integer units; round up so the fee never underpays.
    let amount = raw.ceil();
    TokenAmount::new(denom.clone(), amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Token;
    use std::sync::Mutex;

    struct FakeClient {
        simulate_script: Mutex<Vec<SimulateOutcome>>,
        broadcast_script: Mutex<Vec<BroadcastOutcome>>,
        mempool_has_own_tx: bool,
    }

    #[async_trait]
    impl NodeClient for FakeClient {
        async fn simulate(&self, _messages: &[String], _sequence: u64) -> SimulateOutcome {
            self.simulate_script.lock().unwrap().remove(0)
        }
        async fn broadcast(&self, _messages: &[String], _fee: &TokenAmount, _sequence: u64) -> BroadcastOutcome {
            self.broadcast_script.lock().unwrap().remove(0)
        }
        async fn own_tx_in_mempool(&self, _sequence: u64) -> bool {
            self.mempool_has_own_tx
        }
    }

    fn denom() -> Token {
        Token::native("uusd", "UST", 6)
    }

    #[tokio::test]
    async fn estimate_fee_applies_gas_adjustment() {
        let client = Arc::new(FakeClient {
            simulate_script: Mutex::new(vec![SimulateOutcome::Ok { gas_used: 200_000 }]),
            broadcast_script: Mutex::new(vec![]),
            mempool_has_own_tx: false,
        });
        let signer = Arc::new(SignerState::new(42));
        let mgr = FeeManager::new(
            client,
            signer,
            denom(),
            Decimal::from_str_exact("1.4").unwrap(),
            Decimal::from_str_exact("0.15").unwrap(),
            true,
        );
        let fee = mgr.estimate_fee(&["swap".to_string()]).await.unwrap();
        assert_eq!(fee.gas, 280_000); // ceil(200_000 * 1.4)
    }

    #[tokio::test]
    async fn sequence_mismatch_resyncs_and_retries() {
        let client = Arc::new(FakeClient {
            simulate_script: Mutex::new(vec![
                SimulateOutcome::SequenceMismatch { expected: 43 },
                SimulateOutcome::Ok { gas_used: 100_000 },
            ]),
            broadcast_script: Mutex::new(vec![]),
            mempool_has_own_tx: false,
        });
        let signer = Arc::new(SignerState::new(42));
        let mgr = FeeManager::new(
            client,
            signer.clone(),
            denom(),
            Decimal::ONE,
            Decimal::from_str_exact("0.15").unwrap(),
            true,
        );
        mgr.estimate_fee(&["swap".to_string()]).await.unwrap();
        assert_eq!(signer.sequence(), 43);
    }

    #[tokio::test]
    async fn sequence_mismatch_with_own_tx_in_mempool_aborts() {
        let client = Arc::new(FakeClient {
            simulate_script: Mutex::new(vec![SimulateOutcome::SequenceMismatch { expected: 43 }]),
            broadcast_script: Mutex::new(vec![]),
            mempool_has_own_tx: true,
        });
        let signer = Arc::new(SignerState::new(42));
        let mgr =
            FeeManager::new(client, signer, denom(), Decimal::ONE, Decimal::from_str_exact("0.15").unwrap(), true);
        let err = mgr.estimate_fee(&["swap".to_string()]).await.unwrap_err();
        assert!(matches!(err, ArbError::TxAlreadyBroadcasted));
    }

    #[tokio::test]
    async fn broadcast_increments_sequence_on_success() {
        let client = Arc::new(FakeClient {
            simulate_script: Mutex::new(vec![]),
            broadcast_script: Mutex::new(vec![BroadcastOutcome::Ok { tx_hash: "ABC123".to_string() }]),
            mempool_has_own_tx: false,
        });
        let signer = Arc::new(SignerState::new(42));
        let mgr = FeeManager::new(
            client,
            signer.clone(),
            denom(),
            Decimal::ONE,
            Decimal::from_str_exact("0.15").unwrap(),
            true,
        );
        let fee = EstimatedFee { gas: 100_000, amount: TokenAmount::new(denom(), Decimal::from(15_000)) };
        let hash = mgr.broadcast(&["swap".to_string()], &fee).await.unwrap();
        assert_eq!(hash, "ABC123");
        assert_eq!(signer.sequence(), 43);
    }

    #[tokio::test]
    async fn other_simulation_error_without_fallback_propagates() {
        let client = Arc::new(FakeClient {
            simulate_script: Mutex::new(vec![SimulateOutcome::Other("node unreachable".to_string())]),
            broadcast_script: Mutex::new(vec![]),
            mempool_has_own_tx: false,
        });
        let signer = Arc::new(SignerState::new(42));
        let mgr =
            FeeManager::new(client, signer, denom(), Decimal::ONE, Decimal::from_str_exact("0.15").unwrap(), false);
        let err = mgr.estimate_fee(&["swap".to_string()]).await.unwrap_err();
        assert!(matches!(err, ArbError::FeeEstimationError { .. }));
    }
}
