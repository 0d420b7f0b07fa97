#![cfg(feature = "secp256k1")]

//! secp256k1 instantiation of [`Group`].
//!
//! Exponentiation is scalar multiplication and the group operation is point
//! addition.  Elements are encoded as 33-byte SEC1 compressed points; the
//! point at infinity has no encoding and is rejected on input.

use crate::error::GroupError;
use crate::group::Group;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar};
use num_bigint::BigUint;
use once_cell::sync::Lazy;

const COMPRESSED_LEN: usize = 33;
const SCALAR_LEN: usize = 32;

static CURVE_ORDER: Lazy<BigUint> = Lazy::new(|| {
    BigUint::parse_bytes(
        b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141",
        16,
    )
    .expect("secp256k1 order is valid hex")
});

/// The secp256k1 curve group with the standard base point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Secp256k1Group;

impl Secp256k1Group {
    /// Creates the group handle.
    pub fn new() -> Self {
        Self
    }

    fn to_scalar(&self, exp: &BigUint) -> Scalar {
        let reduced = (exp % &*CURVE_ORDER).to_bytes_be();
        let mut bytes = [0u8; SCALAR_LEN];
        bytes[SCALAR_LEN - reduced.len()..].copy_from_slice(&reduced);
        // Reduced below the order, so the representation is canonical.
        let repr = FieldBytes::from(bytes);
        Option::<Scalar>::from(Scalar::from_repr(repr)).unwrap_or(Scalar::ZERO)
    }
}

impl Group for Secp256k1Group {
    type Element = ProjectivePoint;

    fn name(&self) -> &'static str {
        "secp256k1"
    }

    fn order(&self) -> &BigUint {
        &CURVE_ORDER
    }

    fn generator(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR
    }

    fn encoded_len(&self) -> usize {
        COMPRESSED_LEN
    }

    fn exponentiate(&self, base: &ProjectivePoint, exp: &BigUint) -> ProjectivePoint {
        *base * self.to_scalar(exp)
    }

    fn combine(&self, a: &ProjectivePoint, b: &ProjectivePoint) -> ProjectivePoint {
        *a + *b
    }

    fn serialize(&self, element: &ProjectivePoint) -> Vec<u8> {
        let encoded = element.to_affine().to_encoded_point(true);
        let raw = encoded.as_bytes();
        // Identity encodes as a single zero byte; widen it to the fixed length.
        let mut out = vec![0u8; COMPRESSED_LEN.saturating_sub(raw.len())];
        out.extend_from_slice(raw);
        out
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ProjectivePoint, GroupError> {
        if bytes.len() != COMPRESSED_LEN {
            return Err(GroupError::InvalidEncoding(format!(
                "expected {COMPRESSED_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != 0x02 && bytes[0] != 0x03 {
            return Err(GroupError::InvalidEncoding(
                "expected a compressed point".to_string(),
            ));
        }
        let encoded = EncodedPoint::from_bytes(bytes)
            .map_err(|err| GroupError::InvalidEncoding(err.to_string()))?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or_else(|| GroupError::InvalidEncoding("point is not on the curve".to_string()))?;
        Ok(ProjectivePoint::from(affine))
    }
}
