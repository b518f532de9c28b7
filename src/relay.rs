//! Adapter over the header-chain collaborator.
//!
//! The auction never validates headers itself. It hands raw batches to a
//! [`HeaderChainStore`] and only reads back the store's best digest and
//! height, remembering the last pair it reconciled against as a
//! [`ChainPointer`].

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::header::Digest;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayError {
    #[error("header batch has bad length {0}")]
    BadHeaderLength(usize),
    #[error("anchor {} is not a stored header", hex::encode(.0))]
    UnknownAnchor(Digest),
    #[error("header {} is not stored", hex::encode(.0))]
    UnknownHeader(Digest),
    #[error("header does not extend its predecessor in the batch")]
    BrokenLink,
    #[error("difficulty changed outside a retarget boundary")]
    UnexpectedRetarget,
    #[error("header opens a difficulty period and must be added with a retarget")]
    RetargetRequired,
    #[error("retarget period headers are malformed")]
    BadRetargetPeriod,
    #[error("new difficulty does not match the previous period")]
    BadRetarget,
    #[error("current best does not match the recorded best")]
    StaleAncestor,
    #[error("ancestor is not shared by the current and the new best")]
    NotAncestor,
    #[error("new best is not heavier than the current best")]
    NotHeavier,
    #[error("offset {offset} does not reach the new best at height {height}")]
    BadOffset { offset: u64, height: u64 },
}

/// Collaborator holding the foreign header chain. Any light-client backend
/// can sit behind this without touching the auction.
pub trait HeaderChainStore: Send {
    /// Stores a batch of concatenated headers extending `anchor`.
    fn add_headers(&mut self, anchor: &Digest, headers: &[u8]) -> Result<(), RelayError>;

    /// Stores a batch whose first header opens a new difficulty period.
    /// `old_period_start` and `old_period_end` are the raw first and last
    /// headers of the period that just closed.
    fn add_headers_with_retarget(
        &mut self,
        old_period_start: &[u8],
        old_period_end: &[u8],
        headers: &[u8],
    ) -> Result<(), RelayError>;

    /// Moves the recorded best from `current_best` to `new_best`, which
    /// must sit `offset` headers above it and carry more cumulative work.
    fn request_heaviest_update(
        &mut self,
        ancestor: &Digest,
        current_best: &Digest,
        new_best: &Digest,
        offset: u64,
    ) -> Result<(), RelayError>;

    fn best_digest(&self) -> Digest;

    fn best_height(&self) -> u64;
}

/// Foreign-chain position the auction last reconciled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPointer {
    #[serde(with = "hex::serde")]
    pub digest: Digest,
    pub height: u64,
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::StaleAncestor => Error::StaleAncestor,
            RelayError::NotHeavier => Error::NotHeavier,
            other => Error::Relay(other),
        }
    }
}

#[derive(Debug)]
pub struct ChainTracker<S> {
    store: S,
    pointer: ChainPointer,
}

impl<S: HeaderChainStore> ChainTracker<S> {
    pub fn new(store: S) -> Self {
        let pointer = ChainPointer { digest: store.best_digest(), height: store.best_height() };
        Self { store, pointer }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn last_ancestor(&self) -> ChainPointer {
        self.pointer
    }

    pub fn add_headers(&mut self, anchor: &Digest, headers: &[u8]) -> Result<(), Error> {
        self.store.add_headers(anchor, headers)?;
        tracing::debug!(anchor = %hex::encode(anchor), bytes = headers.len(), "headers stored");
        Ok(())
    }

    pub fn add_headers_with_retarget(
        &mut self,
        old_period_start: &[u8],
        old_period_end: &[u8],
        headers: &[u8],
    ) -> Result<(), Error> {
        self.store.add_headers_with_retarget(old_period_start, old_period_end, headers)?;
        tracing::debug!(bytes = headers.len(), "retarget headers stored");
        Ok(())
    }

    /// Fails with `StaleAncestor` before touching the store when the caller
    /// derived `current_best` from anything but the reconciled pointer.
    pub fn request_heaviest_update(
        &mut self,
        ancestor: &Digest,
        current_best: &Digest,
        new_best: &Digest,
        offset: u64,
    ) -> Result<ChainPointer, Error> {
        if current_best != &self.pointer.digest {
            return Err(Error::StaleAncestor);
        }
        let height = self.pointer.height.checked_add(offset).ok_or(Error::HeightOverflow)?;
        self.store.request_heaviest_update(ancestor, current_best, new_best, offset)?;
        self.pointer = ChainPointer { digest: *new_best, height };
        Ok(self.pointer)
    }

    /// Adopts the store's recorded best when it moved without us. Returns
    /// the new pointer, or `None` when already in agreement. A store that
    /// reports a lower height than the pointer is ignored.
    pub fn resync(&mut self) -> Option<ChainPointer> {
        let best = self.peek_store();
        if best == self.pointer || best.height < self.pointer.height {
            return None;
        }
        self.pointer = best;
        Some(best)
    }

    /// The pointer `resync` would adopt, without adopting it.
    pub fn peek_store(&self) -> ChainPointer {
        ChainPointer { digest: self.store.best_digest(), height: self.store.best_height() }
    }
}
