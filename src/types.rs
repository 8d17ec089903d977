//! Arbitrage lifecycle data model (§3): the value types that flow between
//! the strategy driver, the per-route engine, the fee/broadcaster layers,
//! and the structured-logging boundary.
//!
//! `ArbitrageData`'s state is a pure function of which of its three
//! optional fields are present — see `arbitrage::state` for the derivation.

use crate::pool::PoolKey;
use crate::route::Route;
use crate::token::TokenAmount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fully-planned arbitrage attempt for one route at one height: the
/// chosen direction, sized input, pre-built messages, and the profit
/// estimate that made it worth broadcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbParams {
    pub timestamp: DateTime<Utc>,
    pub block_height_found: u64,
    pub route_index: usize,
    pub reverse: bool,
    pub input_amount: TokenAmount,
    /// Human-readable description of the built message sequence; the wire
    /// encoding and signing of these messages is out of scope (§1).
    pub messages: Vec<String>,
    /// Number of repeated copies to broadcast, `1..=N_max`.
    pub n_repeat: u32,
    pub estimated_output: TokenAmount,
    pub estimated_fee: TokenAmount,
    /// Net profit in the reference token (UST/USDC-equivalent), after fee.
    pub estimated_net_profit: Decimal,
}

/// One broadcasted transaction belonging to an `ArbParams`' `n_repeat` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbTx {
    pub timestamp_sent: DateTime<Utc>,
    pub tx_hash: String,
}

/// Terminal status of one broadcasted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Succeeded,
    Failed,
    NotFound,
}

/// Confirmation outcome for one `ArbTx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbResult {
    pub tx_status: TxStatus,
    pub err_log: Option<String>,
    pub gas_used: Option<u64>,
    pub gas_cost: Option<Decimal>,
    pub inclusion_delay: Option<u64>,
    pub timestamp_received: Option<DateTime<Utc>>,
    pub block_received: Option<u64>,
    pub final_amount: Option<TokenAmount>,
    pub net_profit_ref: Option<Decimal>,
}

impl ArbResult {
    pub fn not_found() -> Self {
        Self {
            tx_status: TxStatus::NotFound,
            err_log: None,
            gas_used: None,
            gas_cost: None,
            inclusion_delay: None,
            timestamp_received: None,
            block_received: None,
            final_amount: None,
            net_profit_ref: None,
        }
    }

    pub fn failed(err_log: String, gas_cost: Decimal) -> Self {
        Self {
            tx_status: TxStatus::Failed,
            err_log: Some(err_log),
            gas_used: None,
            gas_cost: Some(gas_cost),
            inclusion_delay: None,
            timestamp_received: Some(Utc::now()),
            block_received: None,
            final_amount: None,
            net_profit_ref: Some(-gas_cost),
        }
    }
}

/// One route's in-flight lifecycle snapshot. Which fields are `Some`
/// determines the engine's current state (`arbitrage::state::derive_state`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbitrageData {
    pub params: Option<ArbParams>,
    pub txs: Vec<ArbTx>,
    pub results: Vec<ArbResult>,
}

impl ArbitrageData {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-height bucket key for broadcaster-fleet duplicate detection: the
/// signature of the messages about to be broadcast, plus the repeat count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastCacheKey {
    pub signature: String,
    pub n_repeat: u32,
}

impl BroadcastCacheKey {
    pub fn new(signature: impl Into<String>, n_repeat: u32) -> Self {
        Self { signature: signature.into(), n_repeat }
    }
}

/// A planned candidate route bundled with the pools it runs over, handed
/// from the strategy driver down into a single engine instance.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub route: Route,
    pub pools: Vec<PoolKey>,
}

/// Layered configuration (§4.11, §6 "Process boundary"): `.env` → env vars
/// → optional `config.toml` → `clap` CLI overrides, assembled by
/// `config::load_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub chain_id: String,
    pub chain_name: String,

    pub lcd_url: String,
    pub rpc_http_url: String,
    pub rpc_ws_url: String,
    pub grpc_url: String,

    /// Peer broadcaster base URLs this host may route through; see
    /// `broadcaster::fleet`.
    #[serde(default)]
    pub broadcaster_peers: Vec<String>,
    #[serde(default)]
    pub use_broadcaster: bool,
    /// HTTP port this host's own broadcaster endpoint listens on, if it
    /// acts as a peer for others (§6 "a small HTTP endpoint" is out of
    /// scope for its handler, but the port is still a config field peers
    /// dial into).
    #[serde(default = "default_broadcaster_port")]
    pub broadcaster_port: u16,

    /// Opaque handle to a mnemonic-derived signer; signing itself is out
    /// of scope (§1) — this is whatever key the external signer resolves
    /// by name from its secret store.
    pub signer_key_name: String,

    pub fee_denom: String,
    pub gas_adjustment: Decimal,
    pub gas_price: Decimal,
    #[serde(default)]
    pub use_fallback_estimate: bool,

    pub min_profit_ref: Decimal,
    pub max_single_trade_amount: Decimal,
    pub n_repeat_max: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    pub whitelist_path: Option<String>,
    pub address_book_path: Option<String>,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Resolved from `STRATEGY`/`--strategy`; selects a named route-set
    /// out of a small static registry at bootstrap.
    pub strategy: String,
}

fn default_broadcaster_port() -> u16 {
    8089
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_log_format() -> String {
    "pretty".to_string()
}
