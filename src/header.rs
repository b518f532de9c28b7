use ethnum::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::relay::RelayError;

pub type Digest = [u8; 32];

pub const HEADER_LEN: usize = 80;
pub const RETARGET_PERIOD: u64 = 2016;
pub const TARGET_TIMESPAN: u64 = 14 * 24 * 60 * 60;
/// Regtest-style minimum difficulty, also the ceiling for any retarget.
pub const MAX_TARGET_BITS: u32 = 0x207f_ffff;

/// An 80-byte Bitcoin-style header. Fields are stored little-endian on the
/// wire, digests in internal byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    pub prev: Digest,
    pub merkle_root: Digest,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

fn digest_at(bytes: &[u8], at: usize) -> Digest {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&bytes[at..at + 32]);
    digest
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Self, RelayError> {
        if bytes.len() != HEADER_LEN {
            return Err(RelayError::BadHeaderLength(bytes.len()));
        }
        Ok(Self {
            version: le_u32(bytes, 0),
            prev: digest_at(bytes, 4),
            merkle_root: digest_at(bytes, 36),
            timestamp: le_u32(bytes, 68),
            bits: le_u32(bytes, 72),
            nonce: le_u32(bytes, 76),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn digest(&self) -> Digest {
        Sha256::digest(Sha256::digest(self.to_bytes())).into()
    }

    pub fn target(&self) -> U256 {
        target_from_bits(self.bits)
    }

    pub fn work(&self) -> U256 {
        work_from_target(self.target())
    }
}

/// Splits a concatenated batch into headers.
pub fn split_batch(bytes: &[u8]) -> Result<Vec<Header>, RelayError> {
    if bytes.is_empty() || bytes.len() % HEADER_LEN != 0 {
        return Err(RelayError::BadHeaderLength(bytes.len()));
    }
    bytes.chunks(HEADER_LEN).map(Header::parse).collect()
}

pub fn concat(headers: &[Header]) -> Vec<u8> {
    let mut out = Vec::with_capacity(headers.len() * HEADER_LEN);
    for header in headers {
        out.extend_from_slice(&header.to_bytes());
    }
    out
}

pub fn target_from_bits(bits: u32) -> U256 {
    let exponent = bits >> 24;
    let mantissa = U256::from(bits & 0x007f_ffff);
    if exponent <= 3 {
        mantissa >> (8 * (3 - exponent))
    } else if exponent > 34 {
        U256::MAX
    } else {
        mantissa << (8 * (exponent - 3))
    }
}

pub fn bits_from_target(target: U256) -> u32 {
    let mut size = (256 - target.leading_zeros() + 7) / 8;
    let mut compact = if size <= 3 {
        (target << (8 * (3 - size))).as_u32()
    } else {
        (target >> (8 * (size - 3))).as_u32()
    };
    // The sign bit of the mantissa must stay clear.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Expected work to find a header at `target`: 2^256 / (target + 1).
pub fn work_from_target(target: U256) -> U256 {
    if target == U256::MAX {
        return U256::ONE;
    }
    (!target / (target + U256::ONE)) + U256::ONE
}

/// Next-period target from the previous period's target and its first and
/// last timestamps. The timespan is clamped to a factor of four either way.
pub fn retarget(prev_target: U256, first_timestamp: u32, last_timestamp: u32) -> U256 {
    let elapsed = u64::from(last_timestamp.saturating_sub(first_timestamp))
        .clamp(TARGET_TIMESPAN / 4, TARGET_TIMESPAN * 4);
    let ceiling = target_from_bits(MAX_TARGET_BITS);
    // Divide first so the multiply cannot overflow 256 bits.
    let scaled = (prev_target / U256::from(TARGET_TIMESPAN)) * U256::from(elapsed);
    scaled.min(ceiling)
}
