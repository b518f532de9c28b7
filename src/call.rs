use serde::{Deserialize, Serialize};

use crate::account::Signed;
use crate::event::Event;
use crate::header::Digest;
use crate::permit::Permit;
use crate::token::Amount;

/// One auction operation. The caller is always the envelope's signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    Bid {
        round_start: u64,
        amount: Amount,
    },
    BidWithPermit {
        round_start: u64,
        amount: Amount,
        permit: Signed<Permit>,
    },
    WithdrawBid {
        round_start: u64,
    },
    AddHeaders {
        #[serde(with = "hex::serde")]
        anchor: Digest,
        #[serde(with = "hex::serde")]
        headers: Vec<u8>,
    },
    AddHeadersWithRetarget {
        #[serde(with = "hex::serde")]
        old_period_start: Vec<u8>,
        #[serde(with = "hex::serde")]
        old_period_end: Vec<u8>,
        #[serde(with = "hex::serde")]
        headers: Vec<u8>,
    },
    MarkNewHeaviest {
        #[serde(with = "hex::serde")]
        ancestor: Digest,
        #[serde(with = "hex::serde")]
        current_best: Digest,
        #[serde(with = "hex::serde")]
        new_best: Digest,
        offset: u64,
    },
    UpdateRound,
}

/// Signed call envelope. `nonce` must equal the number of calls the signer
/// already had accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Txn {
    pub call: Call,
    pub nonce: u64,
}

/// What an accepted call produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "receipt", rename_all = "snake_case")]
pub enum Receipt {
    Events { events: Vec<Event> },
    Withdrawn { amount: Amount },
    Stored,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{alice, tokens};

    #[test]
    fn envelope_survives_json() {
        let kp = alice();
        let stxn = kp.signed(Txn {
            call: Call::AddHeaders { anchor: [7u8; 32], headers: vec![1, 2, 3] },
            nonce: 3,
        });
        let json = serde_json::to_string(&stxn).unwrap();
        assert!(json.contains("\"call\":\"add_headers\""));
        assert!(json.contains("\"headers\":\"010203\""));
        let back: Signed<Txn> = serde_json::from_str(&json).unwrap();
        assert!(back.verify());
        assert_eq!(back, stxn);
    }

    #[test]
    fn tampered_call_fails_verification() {
        let kp = alice();
        let mut stxn =
            kp.signed(Txn { call: Call::Bid { round_start: 144, amount: tokens(4) }, nonce: 0 });
        stxn.msg.call = Call::Bid { round_start: 144, amount: tokens(5) };
        assert!(!stxn.verify());
    }
}
