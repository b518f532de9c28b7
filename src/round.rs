//! Round state machine.
//!
//! The auction holds one rolling [`ChainPointer`] and the current [`Round`].
//! Every heaviest-chain update either stays inside the current window, where
//! the relayer who pushed the chain furthest takes the slot, or crosses one
//! or more round boundaries, which settles the closing rounds and opens the
//! next one for its best bidder.

use ethnum::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::account::Address;
use crate::config::{Config, ConfigError};
use crate::error::Error;
use crate::event::Event;
use crate::header::Digest;
use crate::ledger::RoundLedger;
use crate::relay::{ChainPointer, ChainTracker, HeaderChainStore};
use crate::settlement::SettlementEngine;
use crate::token::{Amount, ValueToken};

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub start_block: u64,
    #[serde(with = "crate::account::opt_hex", default)]
    pub slot_winner: Option<Address>,
    pub reward_amount: Amount,
    /// Height of the contribution the slot is currently credited for.
    pub credited_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    /// No round opened yet; `start_block` is the window the chain sits in.
    Idle { start_block: u64 },
    InRound(Round),
}

#[derive(Debug)]
pub struct Auction<S, T> {
    pub(crate) config: Config,
    pub(crate) tracker: ChainTracker<S>,
    pub(crate) ledger: RoundLedger,
    pub(crate) settlement: SettlementEngine,
    pub(crate) bid_token: T,
    pub(crate) reward_token: T,
    state: RoundState,
    events: broadcast::Sender<Event>,
}

impl<S: HeaderChainStore, T: ValueToken> Auction<S, T> {
    pub fn new(
        config: Config,
        store: S,
        bid_token: T,
        reward_token: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let tracker = ChainTracker::new(store);
        let start_block = config.round_start(tracker.last_ancestor().height);
        let state = RoundState::Idle { start_block };
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            ledger: RoundLedger::new(config.auction, config.round_length),
            settlement: SettlementEngine::new(&config),
            config,
            tracker,
            bid_token,
            reward_token,
            state,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<Event> {
        self.events.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn current_round(&self) -> Option<&Round> {
        match &self.state {
            RoundState::InRound(round) => Some(round),
            RoundState::Idle { .. } => None,
        }
    }

    pub fn current_start(&self) -> u64 {
        match &self.state {
            RoundState::Idle { start_block } => *start_block,
            RoundState::InRound(round) => round.start_block,
        }
    }

    pub fn last_ancestor(&self) -> ChainPointer {
        self.tracker.last_ancestor()
    }

    pub fn store(&self) -> &S {
        self.tracker.store()
    }

    pub fn ledger(&self) -> &RoundLedger {
        &self.ledger
    }

    pub fn best_bid(&self, round_start: u64) -> Option<Address> {
        self.ledger.best_bid(round_start)
    }

    pub fn bid_token(&self) -> &T {
        &self.bid_token
    }

    pub fn reward_token(&self) -> &T {
        &self.reward_token
    }

    fn window_end(&self) -> u64 {
        self.current_start().saturating_add(self.config.round_length)
    }

    fn publish(&self, events: &[Event]) {
        for event in events {
            // Nobody listening is fine.
            let _ = self.events.send(event.clone());
        }
    }

    pub fn bid(
        &mut self,
        bidder: Address,
        round_start: u64,
        amount: Amount,
    ) -> Result<Event, Error> {
        let current = self.current_start();
        let event = self.ledger.bid(&mut self.bid_token, current, bidder, round_start, amount)?;
        self.publish(std::slice::from_ref(&event));
        Ok(event)
    }

    pub fn withdraw_bid(&mut self, bidder: Address, round_start: u64) -> Result<Amount, Error> {
        let current = self.current_start();
        self.ledger.withdraw_bid(&mut self.bid_token, current, bidder, round_start)
    }

    pub fn add_headers(&mut self, anchor: &Digest, headers: &[u8]) -> Result<(), Error> {
        self.tracker.add_headers(anchor, headers)
    }

    pub fn add_headers_with_retarget(
        &mut self,
        old_period_start: &[u8],
        old_period_end: &[u8],
        headers: &[u8],
    ) -> Result<(), Error> {
        self.tracker.add_headers_with_retarget(old_period_start, old_period_end, headers)
    }

    /// Moves the tracked chain to `new_best` on behalf of `relayer` and
    /// reconciles the rounds against the new height.
    pub fn mark_new_heaviest(
        &mut self,
        relayer: Address,
        ancestor: &Digest,
        current_best: &Digest,
        new_best: &Digest,
        offset: u64,
    ) -> Result<Vec<Event>, Error> {
        let pointer = self.tracker.last_ancestor();
        if current_best != &pointer.digest {
            tracing::warn!(current_best = %hex::encode(current_best), "stale heaviest update");
            return Err(Error::StaleAncestor);
        }
        let height = pointer.height.checked_add(offset).ok_or(Error::HeightOverflow)?;
        self.ensure_funded(height, Some(relayer))?;
        let update = self.tracker.request_heaviest_update(ancestor, current_best, new_best, offset);
        if let Err(e) = update {
            tracing::warn!(error = %e, "heaviest update rejected");
            return Err(e);
        }
        self.advance(height, Some(relayer))
    }

    /// Pulls the rounds back into agreement with whatever height the store
    /// already records.
    pub fn update_round(&mut self) -> Result<Vec<Event>, Error> {
        let pointer = self.tracker.last_ancestor();
        let target = self.tracker.peek_store();
        if target.height < pointer.height {
            tracing::warn!(
                store_height = target.height,
                height = pointer.height,
                "store reports a best below the reconciled pointer"
            );
            return Err(Error::StaleAncestor);
        }
        if target == pointer {
            return Ok(Vec::new());
        }
        self.ensure_funded(target.height, None)?;
        self.tracker.resync();
        tracing::info!(height = target.height, "pointer resynced from store");
        self.advance(target.height, None)
    }

    /// Rejects before anything moves when the reward pool cannot pay every
    /// round that reaching `height` would finalize.
    fn ensure_funded(&self, height: u64, relayer: Option<Address>) -> Result<(), Error> {
        let end = self.window_end();
        if height < end {
            return Ok(());
        }
        let length = self.config.round_length;
        let last = self.config.round_start(height);
        let mut rounds = match self.current_round() {
            Some(round) if round.slot_winner.is_some() => 1,
            _ => 0,
        };
        let skipped = (last - end) / length;
        if relayer.is_some() {
            rounds += skipped;
        } else {
            // Only reached from the store's own height, so bounded by the
            // headers actually stored.
            rounds += (0..skipped)
                .filter(|i| self.ledger.best_bid(end + i * length).is_some())
                .count() as u64;
        }
        self.settlement.ensure_funded(&self.reward_token, self.config.reward_amount, rounds)
    }

    /// Applies the transition for a chain that now sits at `height`.
    fn advance(&mut self, height: u64, relayer: Option<Address>) -> Result<Vec<Event>, Error> {
        let mut events = Vec::new();
        let end = self.window_end();
        if height < end {
            if let (RoundState::InRound(round), Some(relayer)) = (&mut self.state, relayer) {
                if height > round.credited_height {
                    round.credited_height = height;
                    if round.slot_winner != Some(relayer) {
                        let old_winner = round.slot_winner.replace(relayer);
                        tracing::info!(
                            round = round.start_block,
                            new_winner = %hex::encode(relayer),
                            "slot snapped"
                        );
                        events.push(Event::Snap {
                            slot_start_block: round.start_block,
                            old_winner,
                            new_winner: relayer,
                        });
                    }
                }
            }
            self.publish(&events);
            return Ok(events);
        }

        if let RoundState::InRound(round) = &self.state {
            let closing = round.clone();
            self.settlement.finalize_round(
                &mut self.ledger,
                &mut self.bid_token,
                &mut self.reward_token,
                &closing,
            )?;
        }
        let last = self.config.round_start(height);
        let mut start = end;
        loop {
            let (slot_winner, amount) = match self.ledger.best(start) {
                Some((bidder, amount)) => (Some(bidder), amount),
                None => (relayer, U256::ZERO),
            };
            let round = Round {
                start_block: start,
                slot_winner,
                reward_amount: self.config.reward_amount,
                credited_height: height,
            };
            tracing::info!(
                round = start,
                winner = ?slot_winner.map(hex::encode),
                "round opened"
            );
            events.push(Event::NewRound { slot_start_block: start, slot_winner, amount });
            if start >= last {
                self.state = RoundState::InRound(round);
                break;
            }
            // Crossed entirely within this call.
            self.settlement.finalize_round(
                &mut self.ledger,
                &mut self.bid_token,
                &mut self.reward_token,
                &round,
            )?;
            start += self.config.round_length;
        }
        self.publish(&events);
        Ok(events)
    }
}
