use serde::{Deserialize, Serialize};

use crate::account::Address;
use crate::token::Amount;

/// State changes published for the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    Bid {
        #[serde(with = "hex::serde")]
        relayer: Address,
        slot_start_block: u64,
        amount: Amount,
    },
    NewRound {
        slot_start_block: u64,
        #[serde(with = "crate::account::opt_hex", default)]
        slot_winner: Option<Address>,
        /// Winning bid, zero when the slot was not bought.
        amount: Amount,
    },
    Snap {
        slot_start_block: u64,
        #[serde(with = "crate::account::opt_hex", default)]
        old_winner: Option<Address>,
        #[serde(with = "hex::serde")]
        new_winner: Address,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethnum::U256;

    #[test]
    fn addresses_are_hex_everywhere() {
        let event = Event::Snap {
            slot_start_block: 144,
            old_winner: Some([0xab; 32]),
            new_winner: [0xcd; 32],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["old_winner"], serde_json::json!(hex::encode([0xab; 32])));
        assert_eq!(json["new_winner"], serde_json::json!(hex::encode([0xcd; 32])));
        assert_eq!(serde_json::from_value::<Event>(json).unwrap(), event);
    }

    #[test]
    fn unassigned_winner_is_null() {
        let event =
            Event::NewRound { slot_start_block: 288, slot_winner: None, amount: U256::ZERO };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json["slot_winner"].is_null());
        assert_eq!(serde_json::from_value::<Event>(json).unwrap(), event);
    }
}
