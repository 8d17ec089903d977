//! Tx Filter DSL and the pool whitelist/blacklist address book.

pub mod tx_filter;
pub mod whitelist;

pub use tx_filter::{contract_swap_matches, msg_count_is, native_swap_matches, router_swap_matches, Filter};
pub use whitelist::{PoolWhitelist, WhitelistFilter};
