//! Four-state derivation for one route's [`ArbitrageData`] (§4.8).
//!
//! Grounded on `original_source/src/arbitrage/cosmos/repeated_tx_arbitrage.py`
//! (`RepeatedTxArbitrage.state`, a property computed from which of
//! `params`/`txs`/`results` are set rather than a stored enum).

use crate::types::ArbitrageData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    ReadyToPlan,
    ReadyToBroadcast,
    WaitingConfirmation,
    /// Transient: a `run()` call that completes confirmation resets the
    /// data before returning, so callers observe `ReadyToPlan` again on the
    /// next call rather than ever seeing this from outside.
    Finished,
}

/// Pure function of which of `params`/`txs`/`results` are present.
pub fn derive_state(data: &ArbitrageData) -> EngineState {
    match (&data.params, data.txs.is_empty(), data.results.is_empty()) {
        (None, _, _) => EngineState::ReadyToPlan,
        (Some(_), true, _) => EngineState::ReadyToBroadcast,
        (Some(_), false, true) => EngineState::WaitingConfirmation,
        (Some(_), false, false) => EngineState::Finished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, TokenAmount};
    use crate::types::{ArbParams, ArbResult, ArbTx};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn sample_params() -> ArbParams {
        ArbParams {
            timestamp: Utc::now(),
            block_height_found: 100,
            route_index: 0,
            reverse: false,
            input_amount: TokenAmount::new(Token::native("uusd", "UST", 6), Decimal::from(100)),
            messages: vec!["swap".to_string()],
            n_repeat: 1,
            estimated_output: TokenAmount::new(Token::native("uluna", "LUNA", 6), Decimal::from(200)),
            estimated_fee: TokenAmount::new(Token::native("uusd", "UST", 6), Decimal::from(1)),
            estimated_net_profit: Decimal::from(10),
        }
    }

    fn sample_tx() -> ArbTx {
        ArbTx { timestamp_sent: Utc::now(), tx_hash: "ABC".to_string() }
    }

    #[test]
    fn empty_data_is_ready_to_plan() {
        assert_eq!(derive_state(&ArbitrageData::default()), EngineState::ReadyToPlan);
    }

    #[test]
    fn params_without_txs_is_ready_to_broadcast() {
        let mut data = ArbitrageData::default();
        data.params = Some(sample_params());
        assert_eq!(derive_state(&data), EngineState::ReadyToBroadcast);
    }

    #[test]
    fn params_and_txs_without_results_is_waiting_confirmation() {
        let mut data = ArbitrageData::default();
        data.params = Some(sample_params());
        data.txs.push(sample_tx());
        assert_eq!(derive_state(&data), EngineState::WaitingConfirmation);
    }

    #[test]
    fn full_data_is_finished() {
        let mut data = ArbitrageData::default();
        data.params = Some(sample_params());
        data.txs.push(sample_tx());
        data.results.push(ArbResult::not_found());
        assert_eq!(derive_state(&data), EngineState::Finished);
    }
}
