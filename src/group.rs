//! Prime-order groups.
//!
//! The [`Group`] trait is the only place where protocol arithmetic happens:
//! secrets are combined with the generator through [`Group::exponentiate`]
//! and group elements are combined through [`Group::combine`].  The
//! [`ModpGroup`] type implements it for the order-`q` subgroup of the
//! multiplicative group modulo a safe prime `p = 2q + 1`.

use crate::entropy;
use crate::error::GroupError;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use once_cell::sync::Lazy;
use std::fmt;

/// A cyclic group of known prime order together with a fixed generator.
pub trait Group: Send + Sync + 'static {
    /// Representation of a group member.
    type Element: Clone + fmt::Debug + PartialEq + Eq + Send + Sync + 'static;

    /// Short identifier used in logs and parameter listings.
    fn name(&self) -> &'static str;

    /// Prime order of the group (and of the generator).
    fn order(&self) -> &BigUint;

    /// The fixed generator.
    fn generator(&self) -> Self::Element;

    /// Length in bytes of the canonical encoding produced by [`Group::serialize`].
    fn encoded_len(&self) -> usize;

    /// Computes `base^exp` using the group operation.  `exp` is reduced
    /// modulo the group order first.
    fn exponentiate(&self, base: &Self::Element, exp: &BigUint) -> Self::Element;

    /// Applies the group operation to `a` and `b`.
    fn combine(&self, a: &Self::Element, b: &Self::Element) -> Self::Element;

    /// Canonical fixed-length byte encoding of `element`.
    fn serialize(&self, element: &Self::Element) -> Vec<u8>;

    /// Decodes a canonical encoding, rejecting anything that is not a
    /// non-identity group member.
    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Element, GroupError>;

    /// Draws a uniformly random exponent in `[1, order)` from the OS RNG.
    ///
    /// Zero is excluded so that `generator^secret` is never the identity,
    /// which [`Group::deserialize`] refuses.
    fn generate_secret(&self) -> Result<BigUint, GroupError> {
        let span = self.order() - 1u8;
        Ok(entropy::sample_below(&span)? + 1u8)
    }

    /// Computes `generator^exp`.
    fn generator_pow(&self, exp: &BigUint) -> Self::Element {
        self.exponentiate(&self.generator(), exp)
    }

    /// Interprets the canonical encoding of `element` as a big-endian integer.
    fn element_to_integer(&self, element: &Self::Element) -> BigUint {
        BigUint::from_bytes_be(&self.serialize(element))
    }

    /// Inverse of [`Group::element_to_integer`].
    fn element_from_integer(&self, value: &BigUint) -> Result<Self::Element, GroupError> {
        let raw = value.to_bytes_be();
        let len = self.encoded_len();
        if raw.len() > len {
            return Err(GroupError::InvalidEncoding(format!(
                "integer spans {} bytes, encoding is {len}",
                raw.len()
            )));
        }
        let mut bytes = vec![0u8; len - raw.len()];
        bytes.extend_from_slice(&raw);
        self.deserialize(&bytes)
    }
}

/// RFC 3526 group 14 (2048-bit MODP) prime.
const RFC3526_2048_HEX: &str = "FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
     29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
     EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
     E485B576 625E7EC6 F44C42E9 A637ED6B 0BFF5CB6 F406B7ED
     EE386BFB 5A899FA5 AE9F2411 7C4B1FE6 49286651 ECE45B3D
     C2007CB8 A163BF05 98DA4836 1C55D39A 69163FA8 FD24CF5F
     83655D23 DCA3AD96 1C62F356 208552BB 9ED52907 7096966D
     670C354E 4ABC9804 F1746C08 CA18217C 32905E46 2E36CE3B
     E39E772C 180E8603 9B2783A2 EC07A28F B5C55DF0 6F4C52C9
     DE2BCBF6 95581718 3995497C EA956AE5 15D22618 98FA0510
     15728E5A 8AACAA68 FFFFFFFF FFFFFFFF";

static MODP_2048: Lazy<ModpGroup> = Lazy::new(|| {
    let digits: String = RFC3526_2048_HEX
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let modulus =
        BigUint::parse_bytes(digits.as_bytes(), 16).expect("RFC 3526 prime is valid hex");
    ModpGroup::with_name("modp2048", modulus, BigUint::from(2u8))
        .expect("RFC 3526 group 14 parameters are valid")
});

/// Member of a [`ModpGroup`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModpElement(BigUint);

impl ModpElement {
    /// Residue in `[1, p)` representing this element.  Decoded elements are never 1.
    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

/// The order-`q` subgroup of `Z_p^*` for a safe prime `p = 2q + 1`.
///
/// Like any safe-prime construction it does not test `p` for primality;
/// callers of [`ModpGroup::new`] are responsible for supplying a safe prime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModpGroup {
    name: &'static str,
    modulus: BigUint,
    order: BigUint,
    generator: BigUint,
    byte_len: usize,
}

impl ModpGroup {
    /// The 2048-bit MODP group from RFC 3526 with generator 2.
    pub fn rfc3526_2048() -> Self {
        MODP_2048.clone()
    }

    /// Builds a group from a safe prime `p` and a generator of the order-`(p-1)/2` subgroup.
    pub fn new(modulus: BigUint, generator: BigUint) -> Result<Self, GroupError> {
        Self::with_name("modp", modulus, generator)
    }

    fn with_name(
        name: &'static str,
        modulus: BigUint,
        generator: BigUint,
    ) -> Result<Self, GroupError> {
        let two = BigUint::from(2u8);
        if modulus < BigUint::from(5u8) || (&modulus % &two).is_zero() {
            return Err(GroupError::InvalidParameters(
                "modulus must be an odd safe prime >= 5".to_string(),
            ));
        }
        let p_minus_one = &modulus - 1u8;
        if generator < two || generator >= p_minus_one {
            return Err(GroupError::InvalidParameters(
                "generator must lie in [2, p - 1)".to_string(),
            ));
        }
        let order = &p_minus_one >> 1;
        if !generator.modpow(&order, &modulus).is_one() {
            return Err(GroupError::InvalidParameters(
                "generator does not have order (p - 1) / 2".to_string(),
            ));
        }
        let byte_len = (modulus.bits() as usize).div_ceil(8);
        Ok(Self {
            name,
            modulus,
            order,
            generator,
            byte_len,
        })
    }

    /// The safe prime `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }
}

impl Group for ModpGroup {
    type Element = ModpElement;

    fn name(&self) -> &'static str {
        self.name
    }

    fn order(&self) -> &BigUint {
        &self.order
    }

    fn generator(&self) -> ModpElement {
        ModpElement(self.generator.clone())
    }

    fn encoded_len(&self) -> usize {
        self.byte_len
    }

    fn exponentiate(&self, base: &ModpElement, exp: &BigUint) -> ModpElement {
        let exp = exp % &self.order;
        ModpElement(base.0.modpow(&exp, &self.modulus))
    }

    fn combine(&self, a: &ModpElement, b: &ModpElement) -> ModpElement {
        ModpElement((&a.0 * &b.0) % &self.modulus)
    }

    fn serialize(&self, element: &ModpElement) -> Vec<u8> {
        let raw = element.0.to_bytes_be();
        let mut out = vec![0u8; self.byte_len.saturating_sub(raw.len())];
        out.extend_from_slice(&raw);
        out
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ModpElement, GroupError> {
        if bytes.len() != self.byte_len {
            return Err(GroupError::InvalidEncoding(format!(
                "expected {} bytes, got {}",
                self.byte_len,
                bytes.len()
            )));
        }
        let value = BigUint::from_bytes_be(bytes);
        if value.is_zero() || value >= self.modulus {
            return Err(GroupError::InvalidEncoding(
                "residue outside [1, p)".to_string(),
            ));
        }
        if value.is_one() {
            return Err(GroupError::InvalidEncoding(
                "identity is not an acceptable element".to_string(),
            ));
        }
        // Membership in the order-q subgroup.
        if !value.modpow(&self.order, &self.modulus).is_one() {
            return Err(GroupError::InvalidEncoding(
                "element is not in the prime-order subgroup".to_string(),
            ));
        }
        Ok(ModpElement(value))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// p = 2039 = 2 * 1019 + 1; 4 = 2^2 generates the order-1019 subgroup.
    pub(crate) fn small_group() -> ModpGroup {
        ModpGroup::new(BigUint::from(2039u32), BigUint::from(4u32)).unwrap()
    }

    #[test]
    fn rfc_group_has_expected_shape() {
        let group = ModpGroup::rfc3526_2048();
        assert_eq!(group.name(), "modp2048");
        assert_eq!(group.encoded_len(), 256);
        assert_eq!(group.modulus().bits(), 2048);
        assert_eq!(group.order().bits(), 2047);
        let g = group.generator();
        assert!(g.value().modpow(group.order(), group.modulus()).is_one());
        assert!(!g.value().is_one());
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(ModpGroup::new(BigUint::from(2040u32), BigUint::from(4u32)).is_err());
        assert!(ModpGroup::new(BigUint::from(2039u32), BigUint::from(1u32)).is_err());
        // 7 is a quadratic non-residue mod 2039, so its order is 2038.
        assert!(ModpGroup::new(BigUint::from(2039u32), BigUint::from(7u32)).is_err());
    }

    #[test]
    fn exponent_is_reduced_mod_order() {
        let group = small_group();
        let g = group.generator();
        let q = group.order().clone();
        let five = BigUint::from(5u8);
        assert_eq!(
            group.exponentiate(&g, &(&q + &five)),
            group.exponentiate(&g, &five)
        );
    }

    #[test]
    fn combine_adds_exponents() {
        let group = small_group();
        let a = group.generator_pow(&BigUint::from(17u8));
        let b = group.generator_pow(&BigUint::from(25u8));
        assert_eq!(group.combine(&a, &b), group.generator_pow(&BigUint::from(42u8)));
    }

    #[test]
    fn encoding_roundtrip_and_rejections() {
        let group = small_group();
        let x = group.generator_pow(&BigUint::from(321u32));
        let bytes = group.serialize(&x);
        assert_eq!(bytes.len(), 2);
        assert_eq!(group.deserialize(&bytes).unwrap(), x);

        assert!(group.deserialize(&[0, 0]).is_err());
        assert!(group.deserialize(&[0, 1]).is_err()); // identity
        assert!(group.deserialize(&[0x07, 0xF7]).is_err()); // 2039 == p
        assert!(group.deserialize(&[0x00, 0x07]).is_err()); // non-residue
        assert!(group.deserialize(&[0x04]).is_err()); // short
    }

    #[test]
    fn integer_view_roundtrip() {
        let group = small_group();
        let x = group.generator_pow(&BigUint::from(99u8));
        let n = group.element_to_integer(&x);
        assert_eq!(&n, x.value());
        assert_eq!(group.element_from_integer(&n).unwrap(), x);
        assert!(group
            .element_from_integer(&BigUint::from(1u32 << 20))
            .is_err());
        assert!(group.element_from_integer(&BigUint::one()).is_err());
    }

    #[test]
    fn generated_secrets_are_nonzero() {
        // p = 7, q = 3: only 1 and 2 are admissible.
        let tiny = ModpGroup::new(BigUint::from(7u8), BigUint::from(2u8)).unwrap();
        assert_eq!(tiny.order(), &BigUint::from(3u8));
        for _ in 0..64 {
            let secret = tiny.generate_secret().unwrap();
            assert!(secret == BigUint::one() || secret == BigUint::from(2u8));
        }

        let group = small_group();
        for _ in 0..256 {
            let secret = group.generate_secret().unwrap();
            assert!(!secret.is_zero() && &secret < group.order());
        }
    }

    proptest! {
        #[test]
        fn every_non_identity_element_roundtrips(exp in 1u32..1019) {
            let group = small_group();
            let x = group.generator_pow(&BigUint::from(exp));
            prop_assert!(!x.value().is_one());

            let bytes = group.serialize(&x);
            prop_assert_eq!(bytes.len(), group.encoded_len());
            prop_assert_eq!(group.deserialize(&bytes).unwrap(), x.clone());

            let n = group.element_to_integer(&x);
            prop_assert_eq!(group.element_from_integer(&n).unwrap(), x);
        }
    }
}
