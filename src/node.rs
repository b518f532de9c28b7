use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, Mutex};

use crate::account::{Address, Signed};
use crate::call::{Call, Receipt, Txn};
use crate::error::Error;
use crate::event::Event;
use crate::relay::{ChainPointer, HeaderChainStore};
use crate::round::{Auction, RoundState};
use crate::token::ValueToken;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeError {
    #[error("bad signature")]
    BadSig,
    #[error("nonce {got} already used, expected {expected}")]
    SmallNonce { expected: u64, got: u64 },
    #[error("nonce {got} is ahead, expected {expected}")]
    BigNonce { expected: u64, got: u64 },
    #[error(transparent)]
    Auction(#[from] Error),
}

/// Read-only view served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub state: RoundState,
    pub last_ancestor: ChainPointer,
}

#[derive(Debug)]
struct Inner<S, T> {
    auction: Auction<S, T>,
    nonces: HashMap<Address, u64>,
}

/// Serializes every call into the auction. Holding the lock across the
/// whole call keeps the chain pointer and the round bookkeeping in step.
#[derive(Debug)]
pub struct Node<S, T> {
    inner: Mutex<Inner<S, T>>,
    events: broadcast::Sender<Event>,
}

impl<S: HeaderChainStore, T: ValueToken> Node<S, T> {
    pub fn new(auction: Auction<S, T>) -> Self {
        let events = auction.sender();
        Self { inner: Mutex::new(Inner { auction, nonces: HashMap::default() }), events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> Status {
        let inner = self.inner.lock().await;
        Status {
            state: inner.auction.state().clone(),
            last_ancestor: inner.auction.last_ancestor(),
        }
    }

    pub async fn nonce_of(&self, who: &Address) -> u64 {
        self.inner.lock().await.nonces.get(who).copied().unwrap_or_default()
    }

    pub async fn submit(&self, stxn: Signed<Txn>) -> Result<Receipt, NodeError> {
        self.submit_at(stxn, timestamp()).await
    }

    /// Checks the envelope, consumes its nonce and runs the call as the
    /// signer. The nonce is spent even when the auction rejects the call.
    pub async fn submit_at(&self, stxn: Signed<Txn>, now: u64) -> Result<Receipt, NodeError> {
        if !stxn.verify() {
            return Err(NodeError::BadSig);
        }
        let caller = stxn.signer();
        let mut inner = self.inner.lock().await;
        let expected = inner.nonces.get(&caller).copied().unwrap_or_default();
        if stxn.msg.nonce < expected {
            return Err(NodeError::SmallNonce { expected, got: stxn.msg.nonce });
        } else if stxn.msg.nonce > expected {
            return Err(NodeError::BigNonce { expected, got: stxn.msg.nonce });
        }
        inner.nonces.insert(caller, expected + 1);
        let result = dispatch(&mut inner.auction, caller, stxn.msg.call, now);
        if let Err(e) = &result {
            tracing::debug!(caller = %hex::encode(caller), error = %e, "call rejected");
        }
        Ok(result?)
    }
}

fn dispatch<S: HeaderChainStore, T: ValueToken>(
    auction: &mut Auction<S, T>,
    caller: Address,
    call: Call,
    now: u64,
) -> Result<Receipt, Error> {
    let receipt = match call {
        Call::Bid { round_start, amount } => {
            Receipt::Events { events: vec![auction.bid(caller, round_start, amount)?] }
        }
        Call::BidWithPermit { round_start, amount, permit } => Receipt::Events {
            events: vec![auction.bid_with_permit(caller, round_start, amount, &permit, now)?],
        },
        Call::WithdrawBid { round_start } => {
            Receipt::Withdrawn { amount: auction.withdraw_bid(caller, round_start)? }
        }
        Call::AddHeaders { anchor, headers } => {
            auction.add_headers(&anchor, &headers)?;
            Receipt::Stored
        }
        Call::AddHeadersWithRetarget { old_period_start, old_period_end, headers } => {
            auction.add_headers_with_retarget(&old_period_start, &old_period_end, &headers)?;
            Receipt::Stored
        }
        Call::MarkNewHeaviest { ancestor, current_best, new_best, offset } => Receipt::Events {
            events: auction.mark_new_heaviest(caller, &ancestor, &current_best, &new_best, offset)?,
        },
        Call::UpdateRound => Receipt::Events { events: auction.update_round()? },
    };
    Ok(receipt)
}

/// Unix seconds, the clock permits expire against.
pub fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::account::Keypair;
    use crate::error::BidRejection;
    use crate::header;
    use crate::permit;
    use crate::store::MemoryStore;
    use crate::test_helpers::{alice, bob, setup, tokens, AUCTION};
    use crate::token::MemoryToken;
    use std::sync::Arc;

    pub fn node(height: u64) -> (Node<MemoryStore, MemoryToken>, Vec<header::Header>) {
        let (mut auction, _, chain) = setup(height);
        auction.bid_token.approve(&alice().address(), &AUCTION, tokens(500));
        auction.bid_token.approve(&bob().address(), &AUCTION, tokens(500));
        (Node::new(auction), chain)
    }

    fn call(kp: &Keypair, call: Call, nonce: u64) -> Signed<Txn> {
        kp.signed(Txn { call, nonce })
    }

    #[tokio::test]
    async fn nonces_order_calls() {
        let (node, _) = node(143);
        let kp = alice();
        let bid = |nonce| {
            call(&kp, Call::Bid { round_start: 288, amount: tokens(nonce + 1) }, nonce)
        };
        assert!(node.submit(bid(0)).await.is_ok());
        assert_eq!(node.submit(bid(0)).await, Err(NodeError::SmallNonce { expected: 1, got: 0 }));
        assert_eq!(node.submit(bid(2)).await, Err(NodeError::BigNonce { expected: 1, got: 2 }));
        assert!(node.submit(bid(1)).await.is_ok());
        assert_eq!(node.nonce_of(&kp.address()).await, 2);
    }

    #[tokio::test]
    async fn bad_sig() {
        let (node, _) = node(143);
        let mut stxn = call(&alice(), Call::UpdateRound, 0);
        stxn.msg.nonce = 1;
        assert_eq!(node.submit(stxn).await, Err(NodeError::BadSig));
        assert_eq!(node.nonce_of(&alice().address()).await, 0);
    }

    #[tokio::test]
    async fn rejected_call_spends_nonce() {
        let (node, _) = node(143);
        let kp = alice();
        assert_eq!(
            node.submit(call(&kp, Call::Bid { round_start: 0, amount: tokens(1) }, 0)).await,
            Err(NodeError::Auction(Error::InvalidBidAmount(BidRejection::PastRound)))
        );
        assert_eq!(node.nonce_of(&kp.address()).await, 1);
    }

    #[tokio::test]
    async fn relays_through_calls() {
        let (node, chain) = node(143);
        let (a, b) = (alice(), bob());
        let mut events = node.subscribe();
        let genesis = node.status().await.last_ancestor.digest;
        let headers = header::concat(&chain[..2]);
        let receipt = node.submit(call(&b, Call::AddHeaders { anchor: genesis, headers }, 0)).await;
        assert_eq!(receipt, Ok(Receipt::Stored));
        let receipt = node
            .submit(call(
                &a,
                Call::MarkNewHeaviest {
                    ancestor: genesis,
                    current_best: genesis,
                    new_best: chain[1].digest(),
                    offset: 2,
                },
                0,
            ))
            .await;
        let opened = Event::NewRound {
            slot_start_block: 144,
            slot_winner: Some(a.address()),
            amount: tokens(0),
        };
        assert_eq!(receipt, Ok(Receipt::Events { events: vec![opened.clone()] }));
        assert_eq!(events.recv().await.unwrap(), opened);
        assert_eq!(node.status().await.last_ancestor.height, 145);
    }

    #[tokio::test]
    async fn permit_call_uses_submit_clock() {
        let (node, _) = node(143);
        let kp = alice();
        let domain = {
            let inner = node.inner.lock().await;
            inner.auction.bid_token().domain()
        };
        let signed = permit::sign(&kp, domain, AUCTION, tokens(4), 0, 1_000);
        let bid = Call::BidWithPermit { round_start: 288, amount: tokens(4), permit: signed };
        assert_eq!(
            node.submit_at(call(&kp, bid.clone(), 0), 1_001).await,
            Err(NodeError::Auction(Error::PermitInvalid(permit::PermitError::Expired {
                deadline: 1_000,
                now: 1_001
            })))
        );
        assert!(node.submit_at(call(&kp, bid, 1), 999).await.is_ok());
    }

    #[tokio::test]
    async fn racing_relayers_serialize() {
        let (node, chain) = node(143);
        let node = Arc::new(node);
        let genesis = node.status().await.last_ancestor.digest;
        let headers = header::concat(&chain[..3]);
        node.submit(call(&bob(), Call::AddHeaders { anchor: genesis, headers }, 0)).await.unwrap();
        let mut handles = Vec::new();
        for (kp, n) in [(alice(), 2usize), (bob(), 3usize)] {
            let node = node.clone();
            let new_best = chain[n - 1].digest();
            handles.push(tokio::spawn(async move {
                let mark = Call::MarkNewHeaviest {
                    ancestor: genesis,
                    current_best: genesis,
                    new_best,
                    offset: n as u64,
                };
                let nonce = node.nonce_of(&kp.address()).await;
                node.submit(call(&kp, mark, nonce)).await
            }));
        }
        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e, NodeError::Auction(Error::StaleAncestor)),
            }
        }
        assert_eq!(ok, 1);
    }
}
