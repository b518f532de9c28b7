//! Bid book for future rounds.
//!
//! Each round start keeps its standing best bid and every bidder's escrow.
//! Escrow sits with the auction's holding address on the bid token until
//! it is withdrawn or consumed by settlement.

use ethnum::U256;
use std::collections::HashMap;

use crate::account::Address;
use crate::error::{BidRejection, Error, WithdrawRejection};
use crate::event::Event;
use crate::token::{Amount, ValueToken};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Slot {
    best: Option<(Address, Amount)>,
    escrow: HashMap<Address, Amount>,
    /// Set once settlement consumed this bidder's escrow.
    winner: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct RoundLedger {
    holder: Address,
    round_length: u64,
    slots: HashMap<u64, Slot>,
}

impl RoundLedger {
    pub fn new(holder: Address, round_length: u64) -> Self {
        Self { holder, round_length, slots: HashMap::default() }
    }

    pub fn best_bid(&self, round_start: u64) -> Option<Address> {
        self.best(round_start).map(|(bidder, _)| bidder)
    }

    pub fn best(&self, round_start: u64) -> Option<(Address, Amount)> {
        self.slots.get(&round_start).and_then(|slot| slot.best)
    }

    pub fn escrow_of(&self, round_start: u64, bidder: &Address) -> Amount {
        self.slots
            .get(&round_start)
            .and_then(|slot| slot.escrow.get(bidder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Number of rounds still holding escrow or bids.
    pub fn open_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn check_bid(
        &self,
        current_start: u64,
        round_start: u64,
        amount: Amount,
    ) -> Result<(), Error> {
        if round_start <= current_start {
            return Err(Error::InvalidBidAmount(BidRejection::PastRound));
        }
        if round_start % self.round_length != 0 {
            return Err(Error::InvalidBidAmount(BidRejection::Misaligned));
        }
        let best = self.best(round_start).map(|(_, a)| a).unwrap_or(U256::ZERO);
        if amount <= best {
            return Err(Error::InvalidBidAmount(BidRejection::NotHigher));
        }
        Ok(())
    }

    /// Escrows `amount` from `bidder` and makes it the best bid. Earlier
    /// bids stay escrowed under their own bidders.
    pub fn bid<T: ValueToken>(
        &mut self,
        token: &mut T,
        current_start: u64,
        bidder: Address,
        round_start: u64,
        amount: Amount,
    ) -> Result<Event, Error> {
        self.check_bid(current_start, round_start, amount)?;
        token.transfer_from(&self.holder, &bidder, &self.holder, amount)?;
        let slot = self.slots.entry(round_start).or_default();
        *slot.escrow.entry(bidder).or_insert(U256::ZERO) += amount;
        slot.best = Some((bidder, amount));
        tracing::debug!(round_start, bidder = %hex::encode(bidder), %amount, "bid escrowed");
        Ok(Event::Bid { relayer: bidder, slot_start_block: round_start, amount })
    }

    /// Hands `bidder` back their escrow for a concluded round. The current
    /// round's escrow stays locked until settlement consumes the winner's.
    pub fn withdraw_bid<T: ValueToken>(
        &mut self,
        token: &mut T,
        current_start: u64,
        bidder: Address,
        round_start: u64,
    ) -> Result<Amount, Error> {
        if round_start >= current_start {
            return Err(Error::InvalidWithdraw(WithdrawRejection::FutureRound));
        }
        let slot = self
            .slots
            .get(&round_start)
            .ok_or(Error::InvalidWithdraw(WithdrawRejection::NoEscrow))?;
        if slot.winner == Some(bidder) {
            return Err(Error::InvalidWithdraw(WithdrawRejection::SlotWinner));
        }
        let amount = slot
            .escrow
            .get(&bidder)
            .copied()
            .ok_or(Error::InvalidWithdraw(WithdrawRejection::NoEscrow))?;
        token.transfer(&self.holder, &bidder, amount)?;
        if let Some(slot) = self.slots.get_mut(&round_start) {
            slot.escrow.remove(&bidder);
        }
        self.prune(round_start);
        tracing::debug!(round_start, bidder = %hex::encode(bidder), %amount, "escrow withdrawn");
        Ok(amount)
    }

    /// Marks `winner` as the settled slot winner and takes their escrow out
    /// of the withdrawable pool. Returns what was consumed.
    pub(crate) fn consume(&mut self, round_start: u64, winner: Address) -> Amount {
        let consumed = match self.slots.get_mut(&round_start) {
            Some(slot) => {
                slot.winner = Some(winner);
                slot.escrow.remove(&winner).unwrap_or(U256::ZERO)
            }
            None => U256::ZERO,
        };
        self.prune(round_start);
        consumed
    }

    /// Concluded rounds with nothing left to withdraw are dropped.
    fn prune(&mut self, round_start: u64) {
        if self.slots.get(&round_start).map_or(false, |slot| slot.escrow.is_empty()) {
            self.slots.remove(&round_start);
        }
    }
}
