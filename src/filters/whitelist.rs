//! Static pool whitelist/blacklist address book.
//!
//! Validates pools against a JSON config before they enter arbitrage
//! detection. Pools not in the whitelist are rejected (strict mode) or
//! allowed (advisory mode). Blacklisted pools and pairs are always
//! rejected regardless of mode.
//!
//! Config file: `config/pools_whitelist.json`

use crate::pool::PoolKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PoolWhitelist {
    pub version: String,
    pub last_updated: String,
    pub config: WhitelistConfig,
    pub whitelist: WhitelistSection,
    pub blacklist: BlacklistSection,
    #[serde(default)]
    pub observation: Option<ObservationSection>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhitelistConfig {
    pub default_min_liquidity: u128,
    /// "strict" = only whitelisted pools allowed; "advisory" = only blacklisted rejected
    pub whitelist_enforcement: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhitelistSection {
    pub pools: Vec<WhitelistPool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WhitelistPool {
    pub chain_id: String,
    pub pool_id: String,
    pub pair: String,
    pub dex: String,
    pub status: String,
    #[serde(default)]
    pub min_liquidity: Option<u128>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub last_verified: Option<String>,
    /// Per-pool maximum trade size in USD. When set, the optimizer caps the
    /// search range to this amount for any route involving this pool. Pools
    /// without this field use `config.default_min_liquidity`'s sibling
    /// global cap instead.
    #[serde(default)]
    pub max_trade_size_usd: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistSection {
    pub pools: Vec<BlacklistPool>,
    #[serde(default)]
    pub pairs: Vec<BlacklistPair>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistPool {
    pub chain_id: String,
    pub pool_id: String,
    pub pair: String,
    pub dex: String,
    pub reason: String,
    pub date_added: String,
    #[serde(default)]
    pub discovered_by: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlacklistPair {
    pub pair: String,
    pub reason: String,
    pub date_added: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ObservationSection {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub pools: Vec<ObservationPool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ObservationPool {
    pub chain_id: String,
    pub pool_id: String,
    pub pair: String,
    pub concern: String,
    pub status: String,
    pub added: String,
}

// ---------------------------------------------------------------------------
// Precomputed lookup sets (built once at load time)
// ---------------------------------------------------------------------------

/// Fast-lookup wrapper built from the JSON config.
pub struct WhitelistFilter {
    whitelisted: HashSet<PoolKey>,
    blacklisted: HashSet<PoolKey>,
    blacklisted_pairs: HashSet<String>,
    pool_min_liquidity: HashMap<PoolKey, u128>,
    pool_max_trade_size: HashMap<PoolKey, f64>,
    default_min_liquidity: u128,
    /// "strict" or "advisory"
    enforcement: String,
    /// Raw config (retained for logging / debug)
    pub raw: PoolWhitelist,
}

impl WhitelistFilter {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Load from a JSON file path. Returns an error if the file is missing
    /// or unparseable (caller decides whether to fall back to permissive).
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read whitelist file: {}", path))?;

        let raw: PoolWhitelist = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse whitelist JSON: {}", path))?;

        Ok(Self::from_config(raw))
    }

    /// Build from an already-parsed config.
    pub fn from_config(raw: PoolWhitelist) -> Self {
        let whitelisted: HashSet<PoolKey> = raw
            .whitelist
            .pools
            .iter()
            .filter(|p| p.status == "active")
            .map(|p| PoolKey::new(&p.chain_id, &p.pool_id))
            .collect();

        let blacklisted: HashSet<PoolKey> = raw
            .blacklist
            .pools
            .iter()
            .map(|p| PoolKey::new(&p.chain_id, &p.pool_id))
            .collect();

        let blacklisted_pairs: HashSet<String> =
            raw.blacklist.pairs.iter().map(|p| p.pair.to_uppercase()).collect();

        let pool_min_liquidity: HashMap<PoolKey, u128> = raw
            .whitelist
            .pools
            .iter()
            .filter_map(|p| p.min_liquidity.map(|liq| (PoolKey::new(&p.chain_id, &p.pool_id), liq)))
            .collect();

        let pool_max_trade_size: HashMap<PoolKey, f64> = raw
            .whitelist
            .pools
            .iter()
            .filter_map(|p| p.max_trade_size_usd.map(|size| (PoolKey::new(&p.chain_id, &p.pool_id), size)))
            .collect();

        let default_min_liquidity = raw.config.default_min_liquidity;
        let enforcement = raw.config.whitelist_enforcement.clone();

        info!(
            "Whitelist loaded: {} active pools, {} blacklisted pools, {} blacklisted pairs, mode={}",
            whitelisted.len(),
            blacklisted.len(),
            blacklisted_pairs.len(),
            enforcement,
        );

        Self {
            whitelisted,
            blacklisted,
            blacklisted_pairs,
            pool_min_liquidity,
            pool_max_trade_size,
            default_min_liquidity,
            enforcement,
            raw,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Main entry point: is this pool allowed to participate in detection?
    pub fn is_pool_allowed(&self, pool: &PoolKey, pair: &str) -> bool {
        if self.blacklisted.contains(pool) {
            debug!(pool_id = %pool.pool_id, "whitelist: rejected, pool blacklisted");
            return false;
        }

        if self.blacklisted_pairs.contains(&pair.to_uppercase()) {
            debug!(pool_id = %pool.pool_id, pair, "whitelist: rejected, pair blacklisted");
            return false;
        }

        if self.enforcement == "strict" {
            let allowed = self.whitelisted.contains(pool);
            if !allowed {
                debug!(pool_id = %pool.pool_id, "whitelist: rejected, not whitelisted (strict mode)");
            }
            return allowed;
        }

        // Advisory mode: anything not blacklisted is allowed
        true
    }

    /// Minimum liquidity required for a pool to be considered. Priority:
    /// per-pool override, else global default.
    pub fn min_liquidity_for(&self, pool: &PoolKey) -> u128 {
        self.pool_min_liquidity.get(pool).copied().unwrap_or(self.default_min_liquidity)
    }

    /// Maximum trade size (USD) for a pool, if a per-pool cap is set.
    pub fn max_trade_size_for(&self, pool: &PoolKey) -> Option<f64> {
        self.pool_max_trade_size.get(pool).copied()
    }

    /// Number of active whitelisted pools.
    pub fn active_pool_count(&self) -> usize {
        self.whitelisted.len()
    }

    /// Is strict enforcement enabled?
    pub fn is_strict(&self) -> bool {
        self.enforcement == "strict"
    }
}

// ---------------------------------------------------------------------------
// Default (empty, advisory — used when no config file exists)
// ---------------------------------------------------------------------------

impl Default for WhitelistFilter {
    fn default() -> Self {
        warn!("whitelist: no config loaded, using permissive defaults (advisory mode, one built-in pair block)");
        let raw = PoolWhitelist {
            version: "1.0".to_string(),
            last_updated: String::new(),
            config: WhitelistConfig { default_min_liquidity: 1_000_000, whitelist_enforcement: "advisory".to_string() },
            whitelist: WhitelistSection { pools: Vec::new() },
            blacklist: BlacklistSection {
                pools: Vec::new(),
                pairs: vec![BlacklistPair {
                    pair: "LUNC/USTC".to_string(),
                    reason: "systematic phantom liquidity observed post-depeg".to_string(),
                    date_added: "2026-01-28".to_string(),
                }],
            },
            observation: None,
        };
        Self::from_config(raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
