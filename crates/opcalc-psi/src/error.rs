//! Error taxonomy of the Psi-matrix core.
//!
//! Every variant is fatal to the call (or run) that produced it; nothing in the
//! core retries.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PsiError {
    /// Matrix size / weight dimension / record geometry mismatch.
    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    /// The record pool has no free slot left.
    #[error("path record pool exhausted (capacity {capacity})")]
    ResourceExhausted { capacity: usize },

    /// A record handed back to a pool that did not issue it (or issued it
    /// under a previous configuration).
    #[error("path record (slot {slot}) was not issued by this pool")]
    UnknownHandle { slot: u32 },

    #[error("path growth cancelled after {iterations} iteration(s)")]
    Cancelled { iterations: usize },

    #[error("path growth deadline exceeded after {iterations} iteration(s)")]
    DeadlineExceeded { iterations: usize },
}

impl PsiError {
    pub(crate) fn dimension(message: impl Into<String>) -> Self {
        Self::InvalidDimension(message.into())
    }
}

pub type Result<T, E = PsiError> = std::result::Result<T, E>;
