//! Signed, single-use spending authorizations.
//!
//! A permit lets a bidder authorize the escrow pull in the same call as the
//! bid instead of approving the auction beforehand. Permits are bound to
//! one token's domain, expire at `deadline` and carry the owner's next
//! nonce so they cannot be replayed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::account::{Address, Keypair, Signed};
use crate::error::Error;
use crate::event::Event;
use crate::relay::HeaderChainStore;
use crate::round::Auction;
use crate::token::{Amount, TokenError, ValueToken};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    pub version: String,
}

impl Domain {
    pub fn separator(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"relay-auction permit");
        hasher.update((self.name.len() as u64).to_be_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update(self.version.as_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    #[serde(with = "hex::serde")]
    pub domain: [u8; 32],
    #[serde(with = "hex::serde")]
    pub owner: Address,
    #[serde(with = "hex::serde")]
    pub spender: Address,
    pub value: Amount,
    pub nonce: u64,
    /// Unix seconds after which the permit is void.
    pub deadline: u64,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermitError {
    #[error("bad signature")]
    BadSig,
    #[error("signer is not the owner")]
    SignerMismatch,
    #[error("permit owner is not the caller")]
    NotOwner,
    #[error("permit spender is not the auction")]
    WrongSpender,
    #[error("permit bound to another token")]
    WrongDomain,
    #[error("expired at {deadline}, now {now}")]
    Expired { deadline: u64, now: u64 },
    #[error("expected nonce {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },
}

pub fn sign(
    owner: &Keypair,
    domain: [u8; 32],
    spender: Address,
    value: Amount,
    nonce: u64,
    deadline: u64,
) -> Signed<Permit> {
    owner.signed(Permit { domain, owner: owner.address(), spender, value, nonce, deadline })
}

/// Checks everything but the allowance itself. Never mutates.
pub fn verify(
    signed: &Signed<Permit>,
    domain: &[u8; 32],
    nonce: u64,
    now: u64,
) -> Result<(), PermitError> {
    let permit = &signed.msg;
    if &permit.domain != domain {
        return Err(PermitError::WrongDomain);
    }
    if signed.signer() != permit.owner {
        return Err(PermitError::SignerMismatch);
    }
    if !signed.verify() {
        return Err(PermitError::BadSig);
    }
    if now > permit.deadline {
        return Err(PermitError::Expired { deadline: permit.deadline, now });
    }
    if permit.nonce != nonce {
        return Err(PermitError::BadNonce { expected: nonce, got: permit.nonce });
    }
    Ok(())
}

impl<S: HeaderChainStore, T: ValueToken> Auction<S, T> {
    /// Bids with a permit in place of a prior approval. The bid and the
    /// bidder's balance are checked first so a bid that would fail never
    /// burns the permit.
    pub fn bid_with_permit(
        &mut self,
        bidder: Address,
        round_start: u64,
        amount: Amount,
        permit: &Signed<Permit>,
        now: u64,
    ) -> Result<Event, Error> {
        if permit.msg.owner != bidder {
            return Err(Error::PermitInvalid(PermitError::NotOwner));
        }
        if permit.msg.spender != self.config.auction {
            return Err(Error::PermitInvalid(PermitError::WrongSpender));
        }
        if permit.msg.value < amount {
            return Err(Error::Token(TokenError::InsufficientAllowance {
                needed: amount,
                available: permit.msg.value,
            }));
        }
        self.ledger.check_bid(self.current_start(), round_start, amount)?;
        let available = self.bid_token.balance_of(&bidder);
        if available < amount {
            return Err(Error::Token(TokenError::InsufficientBalance { needed: amount, available }));
        }
        self.bid_token.permit(permit, now)?;
        self.bid(bidder, round_start, amount)
    }
}
