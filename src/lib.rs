//! Auction for the right to relay foreign-chain headers.
//!
//! Relayers bid for future rounds of the foreign chain. The best bidder of
//! a round takes its slot when the chain reaches the round's first block,
//! and inside a round whoever pushes the heaviest chain furthest snaps the
//! slot. Each closed round pays its slot winner a fixed reward.

pub mod account;
pub mod app;
pub mod call;
pub mod config;
pub mod error;
pub mod event;
pub mod header;
pub mod ledger;
pub mod node;
pub mod permit;
pub mod relay;
pub mod round;
pub mod settlement;
pub mod store;
pub mod token;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
