//! Fiat–Shamir challenge derivation.
//!
//! The [`Transcript`] type absorbs the canonical encodings of prover
//! messages into a SHA-256 state and squeezes a challenge by reading the
//! digest as a big-endian integer reduced modulo the group order.  Prover
//! and verifier build the transcript through the same function, so the hash
//! and the reduction cannot drift apart.

use crate::group::Group;
use num_bigint::BigUint;
use sha2::{Digest, Sha256};

/// Hash state accumulating prover messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    hasher: Sha256,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbs a canonical byte encoding.
    pub fn append(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Finalises the transcript into a challenge in `[0, order)`.
    pub fn challenge(self, order: &BigUint) -> BigUint {
        BigUint::from_bytes_be(&self.hasher.finalize()) % order
    }
}

/// Derives the challenge `H(serialize(commitment)) mod order`.
pub fn derive_challenge<G: Group>(group: &G, commitment: &G::Element) -> BigUint {
    let mut transcript = Transcript::new();
    transcript.append(&group.serialize(commitment));
    transcript.challenge(group.order())
}
