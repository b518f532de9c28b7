use serde::{Deserialize, Serialize};

use crate::permit::PermitError;
use crate::relay::RelayError;
use crate::token::{Amount, TokenError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidRejection {
    /// The round already opened or is behind the current one.
    PastRound,
    /// Not strictly above the standing best bid.
    NotHigher,
    /// Round start is not on a round boundary.
    Misaligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawRejection {
    FutureRound,
    NoEscrow,
    SlotWinner,
}

/// Every rejection is scoped to the single call that caused it and leaves
/// no state behind.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Error {
    #[error("invalid bid amount: {0:?}")]
    InvalidBidAmount(BidRejection),
    #[error("invalid withdraw: {0:?}")]
    InvalidWithdraw(WithdrawRejection),
    #[error("ancestor does not match the recorded best")]
    StaleAncestor,
    #[error("candidate branch is not heavier than the recorded best")]
    NotHeavier,
    #[error("permit invalid: {0}")]
    PermitInvalid(PermitError),
    #[error("header store rejected the call: {0}")]
    Relay(RelayError),
    #[error("token rejected the transfer: {0}")]
    Token(TokenError),
    #[error("reward pool holds {available}, finalizing needs {needed}")]
    Underfunded { needed: Amount, available: Amount },
    #[error("chain height overflow")]
    HeightOverflow,
}

impl From<TokenError> for Error {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Permit(e) => Error::PermitInvalid(e),
            other => Error::Token(other),
        }
    }
}
