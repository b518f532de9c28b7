//! Fixtures shared by unit tests and benchmarks.

use ethnum::U256;

use crate::account::{Address, Keypair};
use crate::config::Config;
use crate::header::{Digest, Header, MAX_TARGET_BITS};
use crate::round::Auction;
use crate::store::MemoryStore;
use crate::token::{Amount, MemoryToken};

pub const BLOCK_SPACING: u32 = 600;

pub fn regtest_genesis() -> Header {
    Header {
        version: 1,
        prev: [0u8; 32],
        merkle_root: [0x4a; 32],
        timestamp: 1_296_688_602,
        bits: MAX_TARGET_BITS,
        nonce: 2,
    }
}

/// `n` headers extending `parent` at its difficulty, ten minutes apart.
pub fn chain_from(parent: &Header, n: usize) -> Vec<Header> {
    let mut out: Vec<Header> = Vec::with_capacity(n);
    let mut prev = *parent;
    for i in 0..n {
        let header = Header {
            version: prev.version,
            prev: prev.digest(),
            merkle_root: [(i % 251) as u8; 32],
            timestamp: prev.timestamp + BLOCK_SPACING,
            bits: prev.bits,
            nonce: i as u32,
        };
        out.push(header);
        prev = header;
    }
    out
}

/// Re-chains edited headers so each points at its predecessor.
pub fn relink(mut headers: Vec<Header>, anchor: Digest) -> Vec<Header> {
    let mut prev = anchor;
    for header in headers.iter_mut() {
        header.prev = prev;
        prev = header.digest();
    }
    headers
}

/// Whole tokens with 18 decimals.
pub fn tokens(n: u64) -> Amount {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

pub fn alice() -> Keypair {
    Keypair::from_secret(&[0xa1; 32]).expect("fixed secret is valid")
}

pub fn bob() -> Keypair {
    Keypair::from_secret(&[0xb0; 32]).expect("fixed secret is valid")
}

pub const AUCTION: Address = [0xac; 32];

/// An auction over a regtest chain whose genesis sits at `height`, with
/// alice and bob each holding 500 bid tokens and the auction holding 200
/// reward tokens. Returns the auction and enough headers for three rounds.
pub fn setup(height: u64) -> (Auction<MemoryStore, MemoryToken>, Header, Vec<Header>) {
    let genesis = regtest_genesis();
    let store = MemoryStore::new(genesis, height);
    let config = Config { auction: AUCTION, reward_amount: tokens(2), ..Config::default() };
    let mut bid_token = MemoryToken::new("Bid", "1");
    bid_token.mint(&alice().address(), tokens(500));
    bid_token.mint(&bob().address(), tokens(500));
    let mut reward_token = MemoryToken::new("Reward", "1");
    reward_token.mint(&AUCTION, tokens(200));
    let auction = Auction::new(config, store, bid_token, reward_token)
        .expect("default config is valid");
    let chain = chain_from(&genesis, 3 * 144 + 8);
    (auction, genesis, chain)
}
