//! Raw tx -> decoded message decoder.
//!
//! `cosmrs` only ships the proto messages it needs for building and signing
//! transactions; the swap messages this bot actually cares about live in
//! chain-specific modules (Terra's `x/market`, Osmosis's `x/gamm`) that have
//! no crate of their own here. Those are decoded with a handful of local
//! `prost::Message` shapes carrying only the fields the engine inspects —
//! the same narrow-projection principle as [`super::types::CosmosMsg`].
//!
//! Grounded on `mempool/decoder.rs`'s selector-dispatch shape (match on a
//! wire-format discriminant, fall through to `None`/`Other` on anything
//! unrecognized), retargeted from EVM function selectors to protobuf
//! `type_url`s.

use super::types::{CacheEntry, CosmosMsg, DecodedTx};
use crate::pool::PoolKey;
use crate::token::{Token, TokenAmount};
use cosmrs::cosmwasm::MsgExecuteContract;
use cosmrs::tx::Tx;
use cosmrs::Any;
use prost::Message;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tracing::trace;

const TYPE_EXECUTE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";
const TYPE_MARKET_SWAP: &str = "/terra.market.v1beta1.MsgSwap";
const TYPE_GAMM_SWAP_IN: &str = "/osmosis.gamm.v1beta1.MsgSwapExactAmountIn";
const TYPE_GAMM_SWAP_OUT: &str = "/osmosis.gamm.v1beta1.MsgSwapExactAmountOut";

/// Decodes a raw transaction's bytes (as observed in the mempool or a
/// finalized block) into the narrow [`CosmosMsg`] projection every filter
/// and pool cares about. Returns `None` on a proto parse failure; any
/// individual message type this bot doesn't track decodes to
/// [`CosmosMsg::Other`] rather than failing the whole tx.
pub fn decode_raw_tx(bytes: &[u8], chain_id: &str) -> CacheEntry {
    let tx = Tx::from_bytes(bytes).ok()?;
    let msgs = tx.body.messages.iter().map(|any| decode_any(any, chain_id)).collect();
    Some(DecodedTx { raw: hex::encode(bytes), msgs })
}

fn decode_any(any: &Any, chain_id: &str) -> CosmosMsg {
    let result = match any.type_url.as_str() {
        TYPE_EXECUTE_CONTRACT => decode_execute_contract(any, chain_id),
        TYPE_MARKET_SWAP => decode_market_swap(any),
        TYPE_GAMM_SWAP_IN => decode_gamm_swap_in(any, chain_id),
        TYPE_GAMM_SWAP_OUT => decode_gamm_swap_out(any, chain_id),
        other => {
            trace!(type_url = other, "decoder: message type not tracked");
            None
        }
    };
    result.unwrap_or(CosmosMsg::Other)
}

// ---------------------------------------------------------------------------
// CosmWasm: direct swap or CW20 Send-wrapped swap against a Terraswap-shaped
// pair contract.
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct TerraswapAsset {
    info: TerraswapAssetInfo,
    amount: String,
}

#[derive(Deserialize)]
enum TerraswapAssetInfo {
    #[serde(rename = "native_token")]
    Native { denom: String },
    #[serde(rename = "token")]
    Cw20 { contract_addr: String },
}

#[derive(Deserialize)]
struct SwapExecuteMsg {
    swap: SwapBody,
}

#[derive(Deserialize)]
struct SwapBody {
    offer_asset: TerraswapAsset,
    #[serde(default)]
    belief_price: Option<String>,
    #[serde(default)]
    max_spread: Option<String>,
}

#[derive(Deserialize)]
struct SendExecuteMsg {
    send: SendBody,
}

#[derive(Deserialize)]
struct SendBody {
    contract: String,
    amount: String,
    msg: String, // base64-encoded inner ExecuteMsg JSON (the cw20-hook payload)
}

#[derive(Deserialize)]
struct Cw20HookSwap {
    swap: Cw20HookSwapBody,
}

#[derive(Deserialize)]
struct Cw20HookSwapBody {
    #[serde(default)]
    belief_price: Option<String>,
    #[serde(default)]
    max_spread: Option<String>,
}

fn decode_execute_contract(any: &Any, chain_id: &str) -> Option<CosmosMsg> {
    let msg: MsgExecuteContract = any.to_msg().ok()?;
    let raw_json = &msg.msg;

    if let Ok(SwapExecuteMsg { swap }) = serde_json::from_slice::<SwapExecuteMsg>(raw_json) {
        let token = match swap.offer_asset.info {
            TerraswapAssetInfo::Native { denom } => Token::native(denom, "", 6),
            TerraswapAssetInfo::Cw20 { contract_addr } => Token::cw20(contract_addr, "", 6),
        };
        let amount = swap.offer_asset.amount.parse::<u128>().ok()?;
        return Some(CosmosMsg::ContractSwap {
            pool: PoolKey::new(chain_id, msg.contract.to_string()),
            offer: TokenAmount::from_int(token, amount),
            belief_price: swap.belief_price.and_then(|s| Decimal::from_str(&s).ok()),
            max_spread: swap.max_spread.and_then(|s| Decimal::from_str(&s).ok()),
        });
    }

    if let Ok(SendExecuteMsg { send }) = serde_json::from_slice::<SendExecuteMsg>(raw_json) {
        use base64::Engine;
        let inner = base64::engine::general_purpose::STANDARD.decode(&send.msg).ok()?;
        let hook: Cw20HookSwap = serde_json::from_slice(&inner).ok()?;
        let amount = send.amount.parse::<u128>().ok()?;
        // The offered token is the CW20 contract that sent this message,
        // i.e. the outer MsgExecuteContract's own contract field.
        let token = Token::cw20(msg.contract.to_string(), "", 6);
        return Some(CosmosMsg::Cw20Send {
            pool: PoolKey::new(chain_id, send.contract),
            offer: TokenAmount::from_int(token, amount),
            belief_price: hook.swap.belief_price.and_then(|s| Decimal::from_str(&s).ok()),
            max_spread: hook.swap.max_spread.and_then(|s| Decimal::from_str(&s).ok()),
        });
    }

    None
}

// ---------------------------------------------------------------------------
// Terra x/market: native LUNA <-> stablecoin swap.
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
struct ProtoCoin {
    #[prost(string, tag = "1")]
    denom: String,
    #[prost(string, tag = "2")]
    amount: String,
}

#[derive(Clone, PartialEq, Message)]
struct MarketMsgSwap {
    #[prost(string, tag = "1")]
    trader: String,
    #[prost(message, optional, tag = "2")]
    offer_coin: Option<ProtoCoin>,
    #[prost(string, tag = "3")]
    ask_denom: String,
}

fn decode_market_swap(any: &Any) -> Option<CosmosMsg> {
    let msg = MarketMsgSwap::decode(any.value.as_slice()).ok()?;
    let coin = msg.offer_coin?;
    let amount = coin.amount.parse::<u128>().ok()?;
    let token = Token::native(coin.denom, "", 6);
    Some(CosmosMsg::NativeMarketSwap { offer: TokenAmount::from_int(token, amount), ask_denom: msg.ask_denom })
}

// ---------------------------------------------------------------------------
// Osmosis x/gamm: weighted-pool swaps.
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
struct GammSwapAmountInRoute {
    #[prost(uint64, tag = "1")]
    pool_id: u64,
    #[prost(string, tag = "2")]
    token_out_denom: String,
}

#[derive(Clone, PartialEq, Message)]
struct GammMsgSwapExactAmountIn {
    #[prost(string, tag = "1")]
    sender: String,
    #[prost(message, repeated, tag = "2")]
    routes: Vec<GammSwapAmountInRoute>,
    #[prost(message, optional, tag = "3")]
    token_in: Option<ProtoCoin>,
    #[prost(string, tag = "4")]
    token_out_min_amount: String,
}

#[derive(Clone, PartialEq, Message)]
struct GammSwapAmountOutRoute {
    #[prost(uint64, tag = "1")]
    pool_id: u64,
    #[prost(string, tag = "2")]
    token_in_denom: String,
}

#[derive(Clone, PartialEq, Message)]
struct GammMsgSwapExactAmountOut {
    #[prost(string, tag = "1")]
    sender: String,
    #[prost(message, repeated, tag = "2")]
    routes: Vec<GammSwapAmountOutRoute>,
    #[prost(string, tag = "3")]
    token_in_max_amount: String,
    #[prost(message, optional, tag = "4")]
    token_out: Option<ProtoCoin>,
}

fn decode_gamm_swap_in(any: &Any, chain_id: &str) -> Option<CosmosMsg> {
    let msg = GammMsgSwapExactAmountIn::decode(any.value.as_slice()).ok()?;
    let token_in = msg.token_in?;
    let amount = token_in.amount.parse::<u128>().ok()?;
    let token = Token::native(token_in.denom, "", 6);
    let routes = msg
        .routes
        .into_iter()
        .map(|r| (PoolKey::new(chain_id, r.pool_id.to_string()), r.token_out_denom))
        .collect();
    Some(CosmosMsg::OsmosisSwapExactAmountIn {
        routes,
        token_in: TokenAmount::from_int(token, amount),
        token_out_min_denom: msg.token_out_min_amount,
    })
}

fn decode_gamm_swap_out(any: &Any, chain_id: &str) -> Option<CosmosMsg> {
    let msg = GammMsgSwapExactAmountOut::decode(any.value.as_slice()).ok()?;
    let token_out = msg.token_out?;
    let amount = token_out.amount.parse::<u128>().ok()?;
    let token = Token::native(token_out.denom, "", 6);
    let routes = msg
        .routes
        .into_iter()
        .map(|r| (PoolKey::new(chain_id, r.pool_id.to_string()), r.token_in_denom))
        .collect();
    Some(CosmosMsg::OsmosisSwapExactAmountOut { routes, token_out: TokenAmount::from_int(token, amount) })
}
