//! Non-interactive Schnorr proofs of discrete-log knowledge.
//!
//! A proof attempt moves through a fixed sequence of states.  The prover
//! picks a nonce `k` and commits to `t = g^k` ([`Committed`]); the
//! Fiat–Shamir challenge `c = H(t) mod q` replaces the verifier's coin
//! ([`Challenged`]); the response `s = k + c·x mod q` completes the
//! [`Proof`].  The verifier recomputes `c` and accepts iff
//! `g^s == t · y^c`.  Each state is a distinct type consumed by the next
//! step, so a nonce cannot be reused across responses.

use crate::error::GroupError;
use crate::group::Group;
use crate::keypair::KeyPair;
use crate::transcript::derive_challenge;
use num_bigint::BigUint;
use subtle::ConstantTimeEq;

/// The prover's two messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof<E> {
    /// `g^nonce`.
    pub commitment: E,
    /// `nonce + challenge · secret mod q`.
    pub response: BigUint,
}

/// Terminal outcome of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The verification equation holds.
    Valid,
    /// The verification equation does not hold.
    Invalid,
}

impl Verdict {
    /// Returns `true` for [`Verdict::Valid`].
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl From<bool> for Verdict {
    fn from(valid: bool) -> Self {
        if valid {
            Self::Valid
        } else {
            Self::Invalid
        }
    }
}

/// A proof attempt holding a fresh nonce and its commitment.
#[derive(Debug)]
pub struct Committed<'g, G: Group> {
    group: &'g G,
    nonce: BigUint,
    commitment: G::Element,
}

/// A proof attempt whose challenge has been derived.
#[derive(Debug)]
pub struct Challenged<'g, G: Group> {
    group: &'g G,
    nonce: BigUint,
    commitment: G::Element,
    challenge: BigUint,
}

impl<'g, G: Group> Committed<'g, G> {
    /// Draws a nonce from the OS RNG and commits to it.
    pub fn commit(group: &'g G) -> Result<Self, GroupError> {
        let nonce = group.generate_secret()?;
        Ok(Self::with_nonce(group, nonce))
    }

    fn with_nonce(group: &'g G, nonce: BigUint) -> Self {
        let commitment = group.generator_pow(&nonce);
        Self {
            group,
            nonce,
            commitment,
        }
    }

    /// The commitment `g^nonce`.
    pub fn commitment(&self) -> &G::Element {
        &self.commitment
    }

    /// Derives the Fiat–Shamir challenge for this commitment.
    pub fn challenge(self) -> Challenged<'g, G> {
        let challenge = derive_challenge(self.group, &self.commitment);
        Challenged {
            group: self.group,
            nonce: self.nonce,
            commitment: self.commitment,
            challenge,
        }
    }
}

impl<'g, G: Group> Challenged<'g, G> {
    /// The derived challenge.
    pub fn challenge_value(&self) -> &BigUint {
        &self.challenge
    }

    /// Binds nonce, challenge and secret into the final proof.
    pub fn respond(self, secret: &BigUint) -> Proof<G::Element> {
        let order = self.group.order();
        let response = (&self.nonce + &self.challenge * (secret % order)) % order;
        Proof {
            commitment: self.commitment,
            response,
        }
    }
}

/// Produces a proof of knowledge of `keypair`'s secret.
///
/// Fails only when the OS RNG cannot supply a nonce; the caller may retry.
pub fn generate_proof<G: Group>(
    group: &G,
    keypair: &KeyPair<G::Element>,
) -> Result<Proof<G::Element>, GroupError> {
    Ok(Committed::commit(group)?
        .challenge()
        .respond(keypair.secret()))
}

/// Checks `g^response == commitment · public^challenge`.
///
/// Responses outside `[0, q)` are not canonical and are rejected.  The two
/// sides are compared through their encodings in constant time.
pub fn verify_proof<G: Group>(group: &G, proof: &Proof<G::Element>, public: &G::Element) -> Verdict {
    if &proof.response >= group.order() {
        return Verdict::Invalid;
    }
    let challenge = derive_challenge(group, &proof.commitment);
    let lhs = group.generator_pow(&proof.response);
    let rhs = group.combine(&proof.commitment, &group.exponentiate(public, &challenge));
    let lhs = group.serialize(&lhs);
    let rhs = group.serialize(&rhs);
    Verdict::from(bool::from(lhs.ct_eq(&rhs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::small_group;
    use crate::group::ModpGroup;
    use proptest::prelude::*;

    #[test]
    fn honest_proof_verifies() {
        let group = ModpGroup::rfc3526_2048();
        let pair = KeyPair::generate(&group).unwrap();
        let proof = generate_proof(&group, &pair).unwrap();
        assert_eq!(verify_proof(&group, &proof, pair.public()), Verdict::Valid);
    }

    #[test]
    fn proof_for_other_key_fails() {
        let group = ModpGroup::rfc3526_2048();
        let pair = KeyPair::generate(&group).unwrap();
        let other = KeyPair::from_secret(&group, pair.secret() + 1u8);
        let proof = generate_proof(&group, &pair).unwrap();
        assert_eq!(verify_proof(&group, &proof, other.public()), Verdict::Invalid);
    }

    #[test]
    fn typestate_walk_matches_generate_proof() {
        let group = small_group();
        let pair = KeyPair::from_secret(&group, BigUint::from(123u32));
        let committed = Committed::with_nonce(&group, BigUint::from(45u32));
        let commitment = committed.commitment().clone();
        let challenged = committed.challenge();
        let challenge = challenged.challenge_value().clone();
        assert_eq!(challenge, derive_challenge(&group, &commitment));
        let proof = challenged.respond(pair.secret());
        let expected = (BigUint::from(45u32) + challenge * 123u32) % group.order();
        assert_eq!(proof.response, expected);
        assert!(verify_proof(&group, &proof, pair.public()).is_valid());
    }

    #[test]
    fn tampered_commitment_fails() {
        let group = ModpGroup::rfc3526_2048();
        let pair = KeyPair::generate(&group).unwrap();
        let mut proof = generate_proof(&group, &pair).unwrap();
        proof.commitment = group.combine(&proof.commitment, &group.generator());
        assert_eq!(verify_proof(&group, &proof, pair.public()), Verdict::Invalid);
    }

    #[test]
    fn unreduced_response_is_rejected() {
        let group = small_group();
        let pair = KeyPair::from_secret(&group, BigUint::from(9u8));
        let mut proof = generate_proof(&group, &pair).unwrap();
        proof.response += group.order();
        assert_eq!(verify_proof(&group, &proof, pair.public()), Verdict::Invalid);
    }

    #[cfg(feature = "secp256k1")]
    #[test]
    fn curve_backend_proves_and_verifies() {
        let group = crate::curve::Secp256k1Group::new();
        let pair = KeyPair::generate(&group).unwrap();
        let proof = generate_proof(&group, &pair).unwrap();
        assert!(verify_proof(&group, &proof, pair.public()).is_valid());
        let mut forged = proof.clone();
        forged.response = (forged.response + 1u8) % group.order();
        assert!(!verify_proof(&group, &forged, pair.public()).is_valid());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn completeness(secret in 0u32..1019, nonce in 0u32..1019) {
            let group = small_group();
            let pair = KeyPair::from_secret(&group, BigUint::from(secret));
            let proof = Committed::with_nonce(&group, BigUint::from(nonce))
                .challenge()
                .respond(pair.secret());
            prop_assert_eq!(verify_proof(&group, &proof, pair.public()), Verdict::Valid);
        }

        #[test]
        fn perturbed_response_is_rejected(secret in 0u32..1019, delta in 1u32..1019) {
            let group = small_group();
            let pair = KeyPair::from_secret(&group, BigUint::from(secret));
            let mut proof = generate_proof(&group, &pair).unwrap();
            proof.response = (proof.response + delta) % group.order();
            prop_assert_eq!(verify_proof(&group, &proof, pair.public()), Verdict::Invalid);
        }
    }
}
