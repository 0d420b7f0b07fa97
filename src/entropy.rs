//! Secure sampling of exponents.
//!
//! Secrets and nonces are drawn from the operating system RNG.  Each draw
//! reads 128 bits more than the bit length of the bound and reduces the
//! result, which keeps the statistical distance from uniform below 2^-128.
//! A failing RNG is reported as [`GroupError::RandomSource`]; there is no
//! weaker fallback.

use crate::error::GroupError;
use num_bigint::BigUint;
use num_traits::Zero;
use rand::{rngs::OsRng, RngCore};

const EXTRA_BYTES: usize = 16;

/// Draws a uniformly distributed integer in `[0, bound)` from the OS RNG.
pub fn sample_below(bound: &BigUint) -> Result<BigUint, GroupError> {
    sample_below_with(&mut OsRng, bound)
}

/// Draws a uniformly distributed integer in `[0, bound)` from `rng`.
///
/// The caller decides whether `rng` is suitable for secrets; protocol code
/// only ever passes [`OsRng`].
pub fn sample_below_with<R: RngCore + ?Sized>(
    rng: &mut R,
    bound: &BigUint,
) -> Result<BigUint, GroupError> {
    if bound.is_zero() {
        return Err(GroupError::InvalidParameters(
            "sampling bound must be non-zero".to_string(),
        ));
    }
    let len = (bound.bits() as usize).div_ceil(8) + EXTRA_BYTES;
    let mut wide = vec![0u8; len];
    rng.try_fill_bytes(&mut wide)
        .map_err(|err| GroupError::RandomSource(err.to_string()))?;
    Ok(BigUint::from_bytes_be(&wide) % bound)
}
