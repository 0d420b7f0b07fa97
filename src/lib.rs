#![deny(missing_docs)]

//! # schnorr_house
//!
//! **schnorr_house** implements a non-interactive Schnorr proof of knowledge
//! of a discrete logarithm, made non-interactive with the Fiat–Shamir
//! heuristic, together with the small amount of network plumbing needed to
//! run it between a prover and a verifier.
//!
//! ## Features
//!
//! * **Prime-order groups** via the [`Group`] trait: [`ModpGroup`] (the
//!   order-`q` subgroup modulo a safe prime, RFC 3526 group 14 by default)
//!   and, behind the `secp256k1` feature, `Secp256k1Group`.
//! * **Key pairs** ([`KeyPair`]) with `public = g^secret`.
//! * **Proof engine**: [`generate_proof`] and [`verify_proof`], with the
//!   prover expressed as the typestate [`Committed`] → [`Challenged`] → [`Proof`].
//! * **Networking** (feature `net`): a hand-rolled HTTP/1.1-subset wire codec,
//!   a tokio connection server that binds proofs to explicit sessions, and
//!   raw-socket and `reqwest` clients.
//!
//! ## Usage
//!
//! ```rust
//! use schnorr_house::{generate_proof, verify_proof, KeyPair, ModpGroup, Verdict};
//!
//! let group = ModpGroup::rfc3526_2048();
//! let keypair = KeyPair::generate(&group).unwrap();
//! let proof = generate_proof(&group, &keypair).unwrap();
//! assert_eq!(verify_proof(&group, &proof, keypair.public()), Verdict::Valid);
//! ```

pub mod curve;
pub mod entropy;
pub mod error;
pub mod group;
mod keypair;
pub mod net;
mod proof;
mod transcript;

#[cfg(feature = "secp256k1")]
pub use curve::Secp256k1Group;
pub use error::GroupError;
pub use group::{Group, ModpElement, ModpGroup};
pub use keypair::KeyPair;
pub use proof::{generate_proof, verify_proof, Challenged, Committed, Proof, Verdict};
pub use transcript::{derive_challenge, Transcript};
