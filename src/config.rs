use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::account::Address;
use crate::token::Amount;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Configuration settings for the auction.
pub struct Config {
    /// Foreign-chain headers per round.
    pub round_length: u64,
    /// Reward token paid to each finalized round's slot winner.
    pub reward_amount: Amount,
    /// Share of the winner's consumed escrow handed back on settlement,
    /// in basis points.
    pub winner_refund_bps: u32,
    /// Address holding escrowed bids and the reward pool.
    #[serde(with = "hex::serde")]
    pub auction: Address,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("round length must be positive")]
    ZeroRoundLength,
    #[error("refund share {0} exceeds 10000 basis points")]
    RefundTooLarge(u32),
    #[error("malformed config: {0}")]
    Parse(String),
}

#[allow(missing_docs)]
impl Config {
    pub const DEFAULT_ROUND_LENGTH: u64 = 144;
    pub const DEFAULT_WINNER_REFUND_BPS: u32 = 5_000;
    pub const BPS: u32 = 10_000;

    pub fn default_reward() -> Amount {
        U256::from(2_000_000_000_000_000_000u64)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round_length == 0 {
            return Err(ConfigError::ZeroRoundLength);
        }
        if self.winner_refund_bps > Self::BPS {
            return Err(ConfigError::RefundTooLarge(self.winner_refund_bps));
        }
        Ok(())
    }

    /// First block of the round containing `height`.
    pub fn round_start(&self, height: u64) -> u64 {
        height - height % self.round_length
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            round_length: Self::DEFAULT_ROUND_LENGTH,
            reward_amount: Self::default_reward(),
            winner_refund_bps: Self::DEFAULT_WINNER_REFUND_BPS,
            auction: [0u8; 32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_round() {
        let config = Config::default();
        assert_eq!(config.round_start(143), 0);
        assert_eq!(config.round_start(144), 144);
        assert_eq!(config.round_start(287), 144);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = Config::from_json(r#"{ "round_length": 10 }"#).unwrap();
        assert_eq!(config.round_length, 10);
        assert_eq!(config.winner_refund_bps, Config::DEFAULT_WINNER_REFUND_BPS);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            Config::from_json(r#"{ "round_length": 0 }"#),
            Err(ConfigError::ZeroRoundLength)
        );
        assert_eq!(
            Config::from_json(r#"{ "winner_refund_bps": 10001 }"#),
            Err(ConfigError::RefundTooLarge(10_001))
        );
        assert!(matches!(Config::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
