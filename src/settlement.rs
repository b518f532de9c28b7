use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::account::Address;
use crate::config::Config;
use crate::error::Error;
use crate::ledger::RoundLedger;
use crate::round::Round;
use crate::token::{Amount, ValueToken};

/// What finalizing one round paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub slot_start_block: u64,
    #[serde(with = "crate::account::opt_hex", default)]
    pub winner: Option<Address>,
    pub reward: Amount,
    /// Winner escrow taken out of the withdrawable pool.
    pub consumed: Amount,
    /// Part of `consumed` handed back to the winner.
    pub refund: Amount,
}

#[derive(Debug, Clone)]
pub struct SettlementEngine {
    holder: Address,
    refund_bps: u32,
}

impl SettlementEngine {
    pub fn new(config: &Config) -> Self {
        Self { holder: config.auction, refund_bps: config.winner_refund_bps }
    }

    pub fn refund_for(&self, consumed: Amount) -> Amount {
        let bps = U256::from(self.refund_bps);
        let scale = U256::from(Config::BPS);
        match consumed.checked_mul(bps) {
            Some(scaled) => scaled / scale,
            None => consumed / scale * bps,
        }
    }

    /// Fails when the reward pool cannot cover `rounds` payouts.
    pub fn ensure_funded<T: ValueToken>(
        &self,
        reward_token: &T,
        reward: Amount,
        rounds: u64,
    ) -> Result<(), Error> {
        let needed = reward.checked_mul(U256::from(rounds)).unwrap_or(U256::MAX);
        let available = reward_token.balance_of(&self.holder);
        if needed > available {
            return Err(Error::Underfunded { needed, available });
        }
        Ok(())
    }

    /// Pays the round's reward to its slot winner, consumes the winner's
    /// escrow for that round and refunds the configured share of it. The
    /// rest stays with the holder.
    pub fn finalize_round<T: ValueToken>(
        &self,
        ledger: &mut RoundLedger,
        bid_token: &mut T,
        reward_token: &mut T,
        round: &Round,
    ) -> Result<Settlement, Error> {
        let Some(winner) = round.slot_winner else {
            tracing::info!(round = round.start_block, "round closed without a slot winner");
            return Ok(Settlement {
                slot_start_block: round.start_block,
                winner: None,
                reward: U256::ZERO,
                consumed: U256::ZERO,
                refund: U256::ZERO,
            });
        };
        reward_token.transfer(&self.holder, &winner, round.reward_amount)?;
        let consumed = ledger.consume(round.start_block, winner);
        let refund = self.refund_for(consumed);
        if refund > U256::ZERO {
            bid_token.transfer(&self.holder, &winner, refund)?;
        }
        tracing::info!(
            round = round.start_block,
            winner = %hex::encode(winner),
            reward = %round.reward_amount,
            %consumed,
            %refund,
            "round settled"
        );
        Ok(Settlement {
            slot_start_block: round.start_block,
            winner: Some(winner),
            reward: round.reward_amount,
            consumed,
            refund,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{alice, bob, tokens, AUCTION};
    use crate::token::MemoryToken;

    fn setup() -> (SettlementEngine, RoundLedger, MemoryToken, MemoryToken) {
        let config = Config { auction: AUCTION, ..Config::default() };
        let engine = SettlementEngine::new(&config);
        let ledger = RoundLedger::new(AUCTION, config.round_length);
        let mut bid_token = MemoryToken::new("Bid", "1");
        bid_token.mint(&alice().address(), tokens(10));
        bid_token.approve(&alice().address(), &AUCTION, tokens(10));
        let mut reward_token = MemoryToken::new("Reward", "1");
        reward_token.mint(&AUCTION, tokens(3));
        (engine, ledger, bid_token, reward_token)
    }

    fn round(winner: Option<Address>) -> Round {
        Round {
            start_block: 144,
            slot_winner: winner,
            reward_amount: tokens(2),
            credited_height: 146,
        }
    }

    #[test]
    fn pays_reward_and_half_the_stake() {
        let (engine, mut ledger, mut bid_token, mut reward_token) = setup();
        let a = alice().address();
        ledger.bid(&mut bid_token, 0, a, 144, tokens(4)).unwrap();
        let settlement = engine
            .finalize_round(&mut ledger, &mut bid_token, &mut reward_token, &round(Some(a)))
            .unwrap();
        assert_eq!(settlement.consumed, tokens(4));
        assert_eq!(settlement.refund, tokens(2));
        assert_eq!(reward_token.balance_of(&a), tokens(2));
        assert_eq!(bid_token.balance_of(&a), tokens(8));
        // The retained half stays with the holder.
        assert_eq!(bid_token.balance_of(&AUCTION), tokens(2));
    }

    #[test]
    fn snapped_winner_without_stake_gets_reward_only() {
        let (engine, mut ledger, mut bid_token, mut reward_token) = setup();
        let b = bob().address();
        let settlement = engine
            .finalize_round(&mut ledger, &mut bid_token, &mut reward_token, &round(Some(b)))
            .unwrap();
        assert_eq!(settlement.reward, tokens(2));
        assert_eq!(settlement.refund, U256::ZERO);
        assert_eq!(reward_token.balance_of(&b), tokens(2));
    }

    #[test]
    fn unassigned_round_pays_nothing() {
        let (engine, mut ledger, mut bid_token, mut reward_token) = setup();
        let settlement = engine
            .finalize_round(&mut ledger, &mut bid_token, &mut reward_token, &round(None))
            .unwrap();
        assert_eq!(settlement.winner, None);
        assert_eq!(reward_token.balance_of(&AUCTION), tokens(3));
    }

    #[test]
    fn funding_check() {
        let (engine, _, _, reward_token) = setup();
        assert_eq!(engine.ensure_funded(&reward_token, tokens(2), 1), Ok(()));
        assert_eq!(
            engine.ensure_funded(&reward_token, tokens(2), 2),
            Err(Error::Underfunded { needed: tokens(4), available: tokens(3) })
        );
    }

    #[test]
    fn refund_share() {
        let (engine, ..) = setup();
        assert_eq!(engine.refund_for(U256::from(7u32)), U256::from(3u32));
        assert_eq!(
            engine.refund_for(U256::MAX),
            U256::MAX / U256::from(10_000u32) * U256::from(5_000u32)
        );
    }
}
