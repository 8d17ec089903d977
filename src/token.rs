//! Token & Amount Algebra
//!
//! Typed token identities (native denom vs CW20 contract) and fixed-point
//! amounts with token-checked arithmetic.

use crate::error::ArbError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A token identity on a Cosmos-SDK chain: either a native bank-module
/// denom, or a CW20 contract address.
///
/// `Ord` is defined over the variant discriminant then the payload string,
/// so any two tokens have a deterministic `(min, max)` form — used for pool
/// cache keys and for canonicalizing a pool's token pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Token {
    NativeDenom { denom: String, symbol: String, decimals: u8 },
    Cw20 { contract_addr: String, symbol: String, decimals: u8 },
}

impl Token {
    pub fn native(denom: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Token::NativeDenom { denom: denom.into(), symbol: symbol.into(), decimals }
    }

    pub fn cw20(contract_addr: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Token::Cw20 { contract_addr: contract_addr.into(), symbol: symbol.into(), decimals }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Token::NativeDenom { decimals, .. } => *decimals,
            Token::Cw20 { decimals, .. } => *decimals,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Token::NativeDenom { symbol, .. } => symbol,
            Token::Cw20 { symbol, .. } => symbol,
        }
    }

    /// A stable, chain-unique identity string: the native denom, or the
    /// CW20 contract address. Used as a map key independent of symbol.
    pub fn identity(&self) -> &str {
        match self {
            Token::NativeDenom { denom, .. } => denom,
            Token::Cw20 { contract_addr, .. } => contract_addr,
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Token::NativeDenom { .. } => 0,
            Token::Cw20 { .. } => 1,
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> Ordering {
        self.discriminant()
            .cmp(&other.discriminant())
            .then_with(|| self.identity().cmp(other.identity()))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Sort two tokens into their canonical `(min, max)` order.
pub fn sorted_pair(a: Token, b: Token) -> (Token, Token) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// A fixed-point amount of a specific token.
///
/// `amount` is the human-scaled `Decimal` value (e.g. `1.5` UST); `int_amount`
/// (the integer on-chain unit, `floor(amount * 10^decimals)`) is derived on
/// demand rather than stored, so arithmetic never has to keep the two in sync.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAmount {
    pub token: Token,
    pub amount: Decimal,
}

impl TokenAmount {
    pub fn new(token: Token, amount: Decimal) -> Self {
        Self { token, amount }
    }

    pub fn zero(token: Token) -> Self {
        Self { token, amount: Decimal::ZERO }
    }

    /// Build from an on-chain integer amount (the wire representation).
    pub fn from_int(token: Token, int_amount: u128) -> Self {
        let decimals = token.decimals() as u32;
        let amount = Decimal::from_i128_with_scale(int_amount as i128, decimals);
        Self { token, amount }
    }

    /// `floor(amount * 10^decimals)`, the integer unit sent on-chain.
    pub fn int_amount(&self) -> u128 {
        let scaled = self.amount * ten_pow(self.token.decimals());
        scaled.trunc().to_string().parse::<u128>().unwrap_or(0)
    }

    /// Subtract a small fraction of the amount, so that an on-chain
    /// execution bounded below by this value cannot fail integer rounding.
    /// `safety_bips` is parts-per-ten-thousand (e.g. 1 = 0.01%).
    pub fn with_safety_margin(&self, safety_bips: u32) -> TokenAmount {
        if safety_bips == 0 {
            return self.clone();
        }
        let margin = self.amount * Decimal::new(safety_bips as i64, 4);
        TokenAmount { token: self.token.clone(), amount: self.amount - margin }
    }

    fn check_same_token(&self, other: &TokenAmount) -> Result<(), ArbError> {
        if self.token != other.token {
            return Err(ArbError::MismatchedTokens {
                a: self.token.symbol().to_string(),
                b: other.token.symbol().to_string(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &TokenAmount) -> Result<TokenAmount, ArbError> {
        self.check_same_token(other)?;
        Ok(TokenAmount { token: self.token.clone(), amount: self.amount + other.amount })
    }

    pub fn checked_sub(&self, other: &TokenAmount) -> Result<TokenAmount, ArbError> {
        self.check_same_token(other)?;
        Ok(TokenAmount { token: self.token.clone(), amount: self.amount - other.amount })
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

fn ten_pow(decimals: u8) -> Decimal {
    // rust_decimal has no integer pow on Decimal directly usable here for
    // exponents that vary at runtime; build it by scaling 1 down.
    Decimal::from_i128_with_scale(1, 0) * Decimal::from_i128_with_scale(10i128.pow(decimals as u32), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ust() -> Token {
        Token::native("uusd", "UST", 6)
    }

    fn luna() -> Token {
        Token::native("uluna", "LUNA", 6)
    }

    #[test]
    fn canonical_ordering_is_deterministic() {
        let (lo, hi) = sorted_pair(luna(), ust());
        assert_eq!(lo, luna()); // "uluna" < "uusd" lexically
        assert_eq!(hi, ust());
        let (lo2, hi2) = sorted_pair(ust(), luna());
        assert_eq!((lo2, hi2), (luna(), ust())); // order-independent
    }

    #[test]
    fn int_amount_floors() {
        let amt = TokenAmount::new(ust(), dec!(1.9999995));
        assert_eq!(amt.int_amount(), 1_999_999);
    }

    #[test]
    fn from_int_round_trips() {
        let amt = TokenAmount::from_int(ust(), 1_000_000);
        assert_eq!(amt.amount, dec!(1.000000));
    }

    #[test]
    fn mismatched_tokens_is_an_error() {
        let a = TokenAmount::new(ust(), dec!(1));
        let b = TokenAmount::new(luna(), dec!(1));
        assert!(a.checked_add(&b).is_err());
    }

    #[test]
    fn safety_margin_reduces_amount() {
        let amt = TokenAmount::new(ust(), dec!(100));
        let margined = amt.with_safety_margin(1); // 0.01%
        assert!(margined.amount < amt.amount);
        assert_eq!(margined.amount, dec!(99.99));
    }
}
