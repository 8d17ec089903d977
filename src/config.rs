//! Layered configuration (§4.11): `.env` → environment variables →
//! optional `config.toml` → `clap` CLI overrides, in ascending priority.
//!
//! Generalizes the original `dotenv` + `std::env::var` loader to the
//! larger Cosmos configuration surface (per-chain endpoints, broadcaster
//! peers, whitelist paths) by adding an optional structured `config.toml`
//! layer and a `clap` derive for operational overrides, per §4.11.

use crate::types::BotConfig;
use anyhow::{Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// CLI overrides layered on top of env/TOML. Every field is optional so
/// that "unset" means "defer to the lower layers" rather than clap's own
/// default.
#[derive(Debug, Parser)]
#[command(name = "cosmos-arb-bot", about = "Cosmos-SDK on-chain arbitrage execution engine")]
pub struct CliArgs {
    /// Path to an optional `config.toml` overlay.
    #[arg(long, env = "CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Named strategy (route-set) to run.
    #[arg(long, env = "STRATEGY")]
    pub strategy: Option<String>,

    /// Chain to run against (must match a `[chains.<id>]` table in the TOML).
    #[arg(long, env = "CHAIN")]
    pub chain: Option<String>,

    /// `pretty` or `json`.
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Force the broadcaster-fleet path on, bypassing peer election.
    #[arg(long, env = "USE_BROADCASTER")]
    pub use_broadcaster: Option<bool>,
}

/// `config.toml` shape. Every field mirrors a `BotConfig` field and is
/// optional, since the TOML layer is itself optional and env vars may
/// supply the rest.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    chain_id: Option<String>,
    chain_name: Option<String>,
    lcd_url: Option<String>,
    rpc_http_url: Option<String>,
    rpc_ws_url: Option<String>,
    grpc_url: Option<String>,
    #[serde(default)]
    broadcaster_peers: Vec<String>,
    use_broadcaster: Option<bool>,
    broadcaster_port: Option<u16>,
    signer_key_name: Option<String>,
    fee_denom: Option<String>,
    gas_adjustment: Option<String>,
    gas_price: Option<String>,
    use_fallback_estimate: Option<bool>,
    min_profit_ref: Option<String>,
    max_single_trade_amount: Option<String>,
    n_repeat_max: Option<u32>,
    poll_interval_ms: Option<u64>,
    max_retries: Option<u32>,
    whitelist_path: Option<String>,
    address_book_path: Option<String>,
    log_format: Option<String>,
    strategy: Option<String>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_decimal(key: &str) -> Option<Decimal> {
    env_string(key).and_then(|v| Decimal::from_str(&v).ok())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|v| v.parse::<bool>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|v| v.parse::<u32>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key).and_then(|v| v.parse::<u64>().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    env_string(key).and_then(|v| v.parse::<u16>().ok())
}

fn first_some<T>(a: Option<T>, b: Option<T>) -> Option<T> {
    a.or(b)
}

/// Assembles `BotConfig` from `.env` (loaded as a side effect), process
/// environment variables, an optional `config.toml`, and CLI overrides —
/// later layers win. Returns an error if a required field is missing from
/// every layer.
///
/// Takes already-parsed `CliArgs` rather than calling `CliArgs::parse()`
/// itself, so CLI parsing (and its `std::process::exit` on a bad
/// invocation) stays at the binary's entry point, not buried in a library
/// function — the same split the teacher's `backfill_events` bin uses.
pub fn load_config(cli: &CliArgs) -> Result<BotConfig> {
    dotenv::dotenv().ok();

    let toml_cfg: TomlConfig = match &cli.config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("failed to parse config file: {}", path.display()))?
        }
        None => TomlConfig::default(),
    };

    let decimal_field = |env_key: &str, toml_val: &Option<String>, name: &str| -> Result<Decimal> {
        env_decimal(env_key)
            .or_else(|| toml_val.as_deref().and_then(|v| Decimal::from_str(v).ok()))
            .with_context(|| format!("{} not set (env {} or config.toml)", name, env_key))
    };

    let required_string = |env_key: &str, toml_val: &Option<String>, name: &str| -> Result<String> {
        first_some(env_string(env_key), toml_val.clone())
            .with_context(|| format!("{} not set (env {} or config.toml)", name, env_key))
    };

    Ok(BotConfig {
        chain_id: required_string("CHAIN_ID", &toml_cfg.chain_id, "CHAIN_ID")?,
        chain_name: first_some(env_string("CHAIN_NAME"), toml_cfg.chain_name).unwrap_or_default(),

        lcd_url: required_string("LCD_URL", &toml_cfg.lcd_url, "LCD_URL")?,
        rpc_http_url: required_string("RPC_HTTP_URL", &toml_cfg.rpc_http_url, "RPC_HTTP_URL")?,
        rpc_ws_url: required_string("RPC_WS_URL", &toml_cfg.rpc_ws_url, "RPC_WS_URL")?,
        grpc_url: required_string("GRPC_URL", &toml_cfg.grpc_url, "GRPC_URL")?,

        broadcaster_peers: if toml_cfg.broadcaster_peers.is_empty() {
            env_string("BROADCASTER_PEERS")
                .map(|s| s.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty()).collect())
                .unwrap_or_default()
        } else {
            toml_cfg.broadcaster_peers
        },
        use_broadcaster: cli
            .use_broadcaster
            .or_else(|| env_bool("USE_BROADCASTER"))
            .or(toml_cfg.use_broadcaster)
            .unwrap_or(false),
        broadcaster_port: first_some(env_u16("BROADCASTER_PORT"), toml_cfg.broadcaster_port).unwrap_or(8089),

        signer_key_name: required_string("SIGNER_KEY_NAME", &toml_cfg.signer_key_name, "SIGNER_KEY_NAME")?,

        fee_denom: required_string("FEE_DENOM", &toml_cfg.fee_denom, "FEE_DENOM")?,
        gas_adjustment: decimal_field("GAS_ADJUSTMENT", &toml_cfg.gas_adjustment, "GAS_ADJUSTMENT")?,
        gas_price: decimal_field("GAS_PRICE", &toml_cfg.gas_price, "GAS_PRICE")?,
        use_fallback_estimate: first_some(env_bool("USE_FALLBACK_ESTIMATE"), toml_cfg.use_fallback_estimate)
            .unwrap_or(true),

        min_profit_ref: decimal_field("MIN_PROFIT_REF", &toml_cfg.min_profit_ref, "MIN_PROFIT_REF")?,
        max_single_trade_amount: decimal_field(
            "MAX_SINGLE_TRADE_AMOUNT",
            &toml_cfg.max_single_trade_amount,
            "MAX_SINGLE_TRADE_AMOUNT",
        )?,
        n_repeat_max: first_some(env_u32("N_REPEAT_MAX"), toml_cfg.n_repeat_max).unwrap_or(3),

        poll_interval_ms: first_some(env_u64("POLL_INTERVAL_MS"), toml_cfg.poll_interval_ms).unwrap_or(500),
        max_retries: first_some(env_u32("MAX_RETRIES"), toml_cfg.max_retries).unwrap_or(3),

        whitelist_path: first_some(env_string("WHITELIST_PATH"), toml_cfg.whitelist_path),
        address_book_path: first_some(env_string("ADDRESS_BOOK_PATH"), toml_cfg.address_book_path),

        log_format: cli.log_format.or_else(|| env_string("LOG_FORMAT")).or(toml_cfg.log_format).unwrap_or_else(
            || "pretty".to_string(),
        ),

        strategy: cli
            .strategy
            .or_else(|| env_string("STRATEGY"))
            .or(toml_cfg.strategy)
            .context("strategy not set (env STRATEGY, config.toml, or --strategy)")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required_env() {
        std::env::set_var("CHAIN_ID", "columbus-5");
        std::env::set_var("LCD_URL", "http://localhost:1317");
        std::env::set_var("RPC_HTTP_URL", "http://localhost:26657");
        std::env::set_var("RPC_WS_URL", "ws://localhost:26657/websocket");
        std::env::set_var("GRPC_URL", "http://localhost:9090");
        std::env::set_var("SIGNER_KEY_NAME", "arb-bot");
        std::env::set_var("FEE_DENOM", "uusd");
        std::env::set_var("GAS_ADJUSTMENT", "1.4");
        std::env::set_var("GAS_PRICE", "0.15");
        std::env::set_var("MIN_PROFIT_REF", "1.0");
        std::env::set_var("MAX_SINGLE_TRADE_AMOUNT", "10000");
        std::env::set_var("STRATEGY", "terra-luna-ust");
    }

    fn empty_cli() -> CliArgs {
        CliArgs { config_path: None, strategy: None, chain: None, log_format: None, use_broadcaster: None }
    }

    #[test]
    fn loads_from_env_with_defaults() {
        set_required_env();
        let cfg = load_config(&empty_cli()).unwrap();
        assert_eq!(cfg.chain_id, "columbus-5");
        assert_eq!(cfg.n_repeat_max, 3);
        assert_eq!(cfg.broadcaster_port, 8089);
        assert!(!cfg.use_broadcaster);
    }

    #[test]
    fn broadcaster_peers_parsed_from_comma_list() {
        set_required_env();
        std::env::set_var("BROADCASTER_PEERS", "http://a.example,  http://b.example ");
        let cfg = load_config(&empty_cli()).unwrap();
        assert_eq!(cfg.broadcaster_peers, vec!["http://a.example", "http://b.example"]);
        std::env::remove_var("BROADCASTER_PEERS");
    }

    #[test]
    fn cli_strategy_overrides_env() {
        set_required_env();
        let mut cli = empty_cli();
        cli.strategy = Some("osmosis-atom-osmo".to_string());
        let cfg = load_config(&cli).unwrap();
        assert_eq!(cfg.strategy, "osmosis-atom-osmo");
    }
}
