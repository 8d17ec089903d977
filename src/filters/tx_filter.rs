//! Tx Filter DSL: composable predicates over a decoded pending transaction.
//!
//! Grounded on `original_source/src/chains/cosmos/tx_filter.py`
//! (`Filter`/`FilterAll`/`FilterAny`/`FilterMsgsLength`, whose `__and__`/
//! `__or__` flatten nested combinators instead of stacking them). Rust
//! expresses the same tree as a plain enum with `BitAnd`/`BitOr` operator
//! overloads rather than boxed trait objects, since the predicate set is
//! closed.

use crate::mempool::types::{CosmosMsg, DecodedTx};
use crate::pool::PoolKey;
use std::ops::{BitAnd, BitOr};

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The transaction contains exactly `n` messages.
    MsgCountIs(usize),
    /// The first message is a direct pool swap, a CW20-wrapped swap, or a
    /// router send whose operations end at this pool.
    ContractSwapMatches(PoolKey),
    /// A native LUNA<->stablecoin market swap between these two denoms.
    NativeSwapMatches { denom_a: String, denom_b: String },
    /// A router `execute_swap_operations` payload touching any of `pools`
    /// via one of `routers`.
    RouterSwapMatches { pools: Vec<PoolKey>, routers: Vec<String> },
    All(Vec<Filter>),
    Any(Vec<Filter>),
}

pub fn msg_count_is(n: usize) -> Filter {
    Filter::MsgCountIs(n)
}
pub fn contract_swap_matches(pool: PoolKey) -> Filter {
    Filter::ContractSwapMatches(pool)
}
pub fn native_swap_matches(denom_a: impl Into<String>, denom_b: impl Into<String>) -> Filter {
    Filter::NativeSwapMatches { denom_a: denom_a.into(), denom_b: denom_b.into() }
}
pub fn router_swap_matches(pools: Vec<PoolKey>, routers: Vec<String>) -> Filter {
    Filter::RouterSwapMatches { pools, routers }
}

impl Filter {
    pub fn matches(&self, tx: &DecodedTx) -> bool {
        match self {
            Filter::MsgCountIs(n) => tx.msg_count() == *n,
            Filter::ContractSwapMatches(pool) => tx.msgs.iter().any(|m| match m {
                CosmosMsg::ContractSwap { pool: p, .. } | CosmosMsg::Cw20Send { pool: p, .. } => p == pool,
                CosmosMsg::RouterSwap { hops, .. } => hops.contains(pool),
                _ => false,
            }),
            Filter::NativeSwapMatches { denom_a, denom_b } => tx.msgs.iter().any(|m| match m {
                CosmosMsg::NativeMarketSwap { offer, ask_denom } => {
                    (offer.token.identity() == denom_a && ask_denom == denom_b)
                        || (offer.token.identity() == denom_b && ask_denom == denom_a)
                }
                _ => false,
            }),
            Filter::RouterSwapMatches { pools, routers } => tx.msgs.iter().any(|m| match m {
                CosmosMsg::RouterSwap { router, hops, .. } => {
                    routers.contains(router) && hops.iter().any(|h| pools.contains(h))
                }
                _ => false,
            }),
            Filter::All(fs) => fs.iter().all(|f| f.matches(tx)),
            Filter::Any(fs) => fs.iter().any(|f| f.matches(tx)),
        }
    }
}

impl BitAnd for Filter {
    type Output = Filter;
    fn bitand(self, rhs: Filter) -> Filter {
        match (self, rhs) {
            (Filter::All(mut a), Filter::All(b)) => {
                a.extend(b);
                Filter::All(a)
            }
            (Filter::All(mut a), rhs) => {
                a.push(rhs);
                Filter::All(a)
            }
            (lhs, Filter::All(mut b)) => {
                b.insert(0, lhs);
                Filter::All(b)
            }
            (lhs, rhs) => Filter::All(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Filter {
    type Output = Filter;
    fn bitor(self, rhs: Filter) -> Filter {
        match (self, rhs) {
            (Filter::Any(mut a), Filter::Any(b)) => {
                a.extend(b);
                Filter::Any(a)
            }
            (Filter::Any(mut a), rhs) => {
                a.push(rhs);
                Filter::Any(a)
            }
            (lhs, Filter::Any(mut b)) => {
                b.insert(0, lhs);
                Filter::Any(b)
            }
            (lhs, rhs) => Filter::Any(vec![lhs, rhs]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, TokenAmount};
    use rust_decimal_macros::dec;

    fn pool_key() -> PoolKey {
        PoolKey::new("columbus-5", "pair1")
    }

    fn swap_tx() -> DecodedTx {
        DecodedTx {
            raw: "abc".into(),
            msgs: vec![CosmosMsg::ContractSwap {
                pool: pool_key(),
                offer: TokenAmount::new(Token::native("uusd", "UST", 6), dec!(100)),
                belief_price: None,
                max_spread: None,
            }],
        }
    }

    #[test]
    fn and_matches_iff_both_match() {
        let f = msg_count_is(1) & contract_swap_matches(pool_key());
        assert!(f.matches(&swap_tx()));

        let f2 = msg_count_is(2) & contract_swap_matches(pool_key());
        assert!(!f2.matches(&swap_tx()));
    }

    #[test]
    fn or_matches_iff_either_matches() {
        let f = msg_count_is(99) | contract_swap_matches(pool_key());
        assert!(f.matches(&swap_tx()));

        let f2 = msg_count_is(99) | contract_swap_matches(PoolKey::new("columbus-5", "other"));
        assert!(!f2.matches(&swap_tx()));
    }

    #[test]
    fn and_flattens_nested_all() {
        let f = (msg_count_is(1) & msg_count_is(2)) & msg_count_is(3);
        assert_eq!(f, Filter::All(vec![Filter::MsgCountIs(1), Filter::MsgCountIs(2), Filter::MsgCountIs(3)]));
    }

    #[test]
    fn or_flattens_nested_any() {
        let f = (msg_count_is(1) | msg_count_is(2)) | msg_count_is(3);
        assert_eq!(f, Filter::Any(vec![Filter::MsgCountIs(1), Filter::MsgCountIs(2), Filter::MsgCountIs(3)]));
    }
}
