//! In-memory header chain, the reference [`HeaderChainStore`].
//!
//! It links headers and accounts cumulative work and difficulty periods.
//! Proof-of-work targets are not checked.

use ethnum::U256;
use std::collections::HashMap;

use crate::header::{self, Digest, Header, RETARGET_PERIOD};
use crate::relay::{HeaderChainStore, RelayError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    header: Header,
    height: u64,
    chainwork: U256,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    headers: HashMap<Digest, Entry>,
    best: Digest,
}

impl MemoryStore {
    /// Starts a chain at `genesis`, which is trusted to sit at `height`.
    pub fn new(genesis: Header, height: u64) -> Self {
        let digest = genesis.digest();
        let mut headers = HashMap::default();
        headers.insert(digest, Entry { header: genesis, height, chainwork: genesis.work() });
        Self { headers, best: digest }
    }

    pub fn height_of(&self, digest: &Digest) -> Option<u64> {
        self.headers.get(digest).map(|e| e.height)
    }

    pub fn chainwork_of(&self, digest: &Digest) -> Option<U256> {
        self.headers.get(digest).map(|e| e.chainwork)
    }

    fn entry(&self, digest: &Digest) -> Result<&Entry, RelayError> {
        self.headers.get(digest).ok_or(RelayError::UnknownHeader(*digest))
    }

    /// Validates a whole batch against `anchor` before storing any of it.
    /// `opening_bits` is the difficulty a retarget batch must open with.
    fn insert_batch(
        &mut self,
        anchor: &Digest,
        headers: &[Header],
        opening_bits: Option<u32>,
    ) -> Result<(), RelayError> {
        let parent = self.headers.get(anchor).ok_or(RelayError::UnknownAnchor(*anchor))?;
        let mut prev = (*anchor, parent.height, parent.chainwork, parent.header.bits);
        let mut staged = Vec::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            let (prev_digest, prev_height, prev_work, prev_bits) = prev;
            if header.prev != prev_digest {
                return Err(RelayError::BrokenLink);
            }
            let height = prev_height + 1;
            let expected_bits = match (i, opening_bits) {
                (0, Some(bits)) => bits,
                _ if height % RETARGET_PERIOD == 0 => return Err(RelayError::RetargetRequired),
                _ => prev_bits,
            };
            if header.bits != expected_bits {
                return Err(RelayError::UnexpectedRetarget);
            }
            let entry = Entry { header: *header, height, chainwork: prev_work + header.work() };
            let digest = header.digest();
            prev = (digest, height, entry.chainwork, header.bits);
            staged.push((digest, entry));
        }
        for (digest, entry) in staged {
            self.headers.entry(digest).or_insert(entry);
        }
        Ok(())
    }

    /// Walks back from `descendant` at most `depth` steps looking for
    /// `ancestor`.
    fn is_ancestor(&self, ancestor: &Digest, descendant: &Digest, depth: u64) -> bool {
        let mut cursor = *descendant;
        for _ in 0..=depth {
            if &cursor == ancestor {
                return true;
            }
            match self.headers.get(&cursor) {
                Some(entry) => cursor = entry.header.prev,
                None => return false,
            }
        }
        false
    }
}

impl HeaderChainStore for MemoryStore {
    fn add_headers(&mut self, anchor: &Digest, headers: &[u8]) -> Result<(), RelayError> {
        let headers = header::split_batch(headers)?;
        self.insert_batch(anchor, &headers, None)
    }

    fn add_headers_with_retarget(
        &mut self,
        old_period_start: &[u8],
        old_period_end: &[u8],
        headers: &[u8],
    ) -> Result<(), RelayError> {
        let start = Header::parse(old_period_start)?;
        let end = Header::parse(old_period_end)?;
        let headers = header::split_batch(headers)?;
        let start_height = self.entry(&start.digest())?.height;
        let end_digest = end.digest();
        let end_height = self.entry(&end_digest)?.height;
        if start_height % RETARGET_PERIOD != 0
            || end_height != start_height + RETARGET_PERIOD - 1
            || start.bits != end.bits
        {
            return Err(RelayError::BadRetargetPeriod);
        }
        let expected = header::retarget(start.target(), start.timestamp, end.timestamp);
        let opening_bits = header::bits_from_target(expected);
        if headers[0].bits != opening_bits {
            return Err(RelayError::BadRetarget);
        }
        self.insert_batch(&end_digest, &headers, Some(opening_bits))
    }

    fn request_heaviest_update(
        &mut self,
        ancestor: &Digest,
        current_best: &Digest,
        new_best: &Digest,
        offset: u64,
    ) -> Result<(), RelayError> {
        if current_best != &self.best {
            return Err(RelayError::StaleAncestor);
        }
        let current = self.entry(current_best)?;
        let candidate = self.entry(new_best)?;
        let anchor = self.entry(ancestor)?;
        if current.height.checked_add(offset) != Some(candidate.height) {
            return Err(RelayError::BadOffset { offset, height: candidate.height });
        }
        if candidate.chainwork <= current.chainwork {
            return Err(RelayError::NotHeavier);
        }
        let (candidate_depth, current_depth) = match (
            candidate.height.checked_sub(anchor.height),
            current.height.checked_sub(anchor.height),
        ) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(RelayError::NotAncestor),
        };
        if !self.is_ancestor(ancestor, new_best, candidate_depth)
            || !self.is_ancestor(ancestor, current_best, current_depth)
        {
            return Err(RelayError::NotAncestor);
        }
        self.best = *new_best;
        Ok(())
    }

    fn best_digest(&self) -> Digest {
        self.best
    }

    fn best_height(&self) -> u64 {
        self.headers.get(&self.best).map(|e| e.height).unwrap_or_default()
    }
}
