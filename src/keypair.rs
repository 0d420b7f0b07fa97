//! Prover key material.

use crate::error::GroupError;
use crate::group::Group;
use num_bigint::BigUint;
use std::fmt;

/// A discrete-log key pair with `public = generator^secret`.
///
/// The public half is safe to disclose.  The secret is a capability: only
/// explicit debug paths ever put it on the wire, and `Debug` output redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair<E> {
    secret: BigUint,
    public: E,
}

impl<E> KeyPair<E> {
    /// Draws a fresh secret from the OS RNG and derives the public element.
    pub fn generate<G: Group<Element = E>>(group: &G) -> Result<Self, GroupError> {
        let secret = group.generate_secret()?;
        Ok(Self::from_secret(group, secret))
    }

    /// Derives the key pair for an existing secret (reduced modulo the group order).
    pub fn from_secret<G: Group<Element = E>>(group: &G, secret: BigUint) -> Self {
        let secret = secret % group.order();
        let public = group.generator_pow(&secret);
        Self { secret, public }
    }

    /// Validates a claimed `(public, secret)` pair.
    pub fn check<G: Group<Element = E>>(
        group: &G,
        public: E,
        secret: BigUint,
    ) -> Result<Self, GroupError>
    where
        E: PartialEq,
    {
        if &secret >= group.order() {
            return Err(GroupError::InvalidEncoding(
                "secret is not reduced modulo the group order".to_string(),
            ));
        }
        let pair = Self::from_secret(group, secret);
        if pair.public != public {
            return Err(GroupError::InvalidEncoding(
                "public element does not match the secret".to_string(),
            ));
        }
        Ok(pair)
    }

    /// The public element.
    pub fn public(&self) -> &E {
        &self.public
    }

    /// The secret exponent.
    pub fn secret(&self) -> &BigUint {
        &self.secret
    }
}

impl<E: fmt::Debug> fmt::Debug for KeyPair<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("secret", &"<redacted>")
            .field("public", &self.public)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::tests::small_group;

    #[test]
    fn public_is_generator_power() {
        let group = small_group();
        let pair = KeyPair::generate(&group).unwrap();
        assert!(pair.secret() < group.order());
        assert_eq!(pair.public(), &group.generator_pow(pair.secret()));
    }

    #[test]
    fn check_rejects_mismatched_pairs() {
        let group = small_group();
        let pair = KeyPair::from_secret(&group, BigUint::from(10u8));
        let ok = KeyPair::check(&group, pair.public().clone(), BigUint::from(10u8)).unwrap();
        assert_eq!(ok, pair);

        let other = group.generator_pow(&BigUint::from(11u8));
        assert!(KeyPair::check(&group, other, BigUint::from(10u8)).is_err());
        let unreduced = group.order() + 10u8;
        assert!(KeyPair::check(&group, pair.public().clone(), unreduced).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let group = small_group();
        let pair = KeyPair::from_secret(&group, BigUint::from(987u32));
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("987"));
    }
}
