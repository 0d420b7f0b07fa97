//! Error types shared by the group backends and the proof engine.

use thiserror::Error;

/// Errors raised by group arithmetic, encoding and secret sampling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("invalid group element encoding: {0}")]
    /// A byte string or integer does not encode a member of the group.
    InvalidEncoding(String),
    #[error("secure random source unavailable: {0}")]
    /// The operating system RNG failed; there is no fallback source.
    RandomSource(String),
    #[error("invalid group parameters: {0}")]
    /// Modulus, generator or order failed validation.
    InvalidParameters(String),
}

impl GroupError {
    /// Returns `true` when the error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RandomSource(_))
    }
}
