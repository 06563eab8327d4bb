//! Multiplicative blinding of encrypted distances.
//!
//! A silo holding distance `d` samples `r > 0` and publishes
//! `P = E(d) * r + E(r) = E(r (d + 1))`. Its pair partner, holding `r'`,
//! multiplies `P` by `r'`; the initiator does the same to the partner's value.
//! The difference of the two doubly blinded values is `E(r r' (d - d'))`,
//! whose sign is the sign of `d - d'` since `r r' > 0`.
//!
//! The decrypted difference still reveals `|r r' (d - d')|` to the key owner.
//! Only its sign is used.

use crate::he::{ScalarCiphertext, ScalarContext};
use crate::{Error, Result};
use fednn_util::sample_blinding_factor;
use fhe::bfv::PublicKey;
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A positive blinding factor, sampled per silo and per query.
///
/// Never serialized; wiped on drop.
pub struct BlindingFactor(u64);

impl BlindingFactor {
    /// Samples a factor uniformly in `[1, max]`.
    pub fn sample<R: RngCore + CryptoRng>(max: u64, rng: &mut R) -> Result<Self> {
        if max == 0 {
            return Err(Error::unsafe_parameters("blinding factors must be positive"));
        }
        Ok(Self(sample_blinding_factor(max, rng)))
    }

    /// Wraps a fixed factor.
    pub fn new(value: u64) -> Result<Self> {
        if value == 0 || value > i64::MAX as u64 {
            return Err(Error::unsafe_parameters(format!(
                "invalid blinding factor {value}"
            )));
        }
        Ok(Self(value))
    }

    fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl Zeroize for BlindingFactor {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for BlindingFactor {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for BlindingFactor {}

impl fmt::Debug for BlindingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlindingFactor(..)")
    }
}

/// Encrypts `distance` and blinds it: `E(d) * r + E(r) = E(r (d + 1))`.
///
/// The `+ 1` keeps a zero distance from collapsing the blinding.
pub fn perturb<R: RngCore + CryptoRng>(
    context: &ScalarContext,
    pk: &PublicKey,
    distance: i64,
    r: &BlindingFactor,
    rng: &mut R,
) -> Result<ScalarCiphertext> {
    let encrypted = context.encrypt(pk, distance, rng)?;
    let offset = context.encrypt(pk, r.as_i64(), rng)?;
    context.add(&context.mul_plain(&encrypted, r.as_i64())?, &offset)
}

/// Blinds the partner's perturbed value with this silo's own factor:
/// `E(r' (d' + 1)) * r = E(r r' (d' + 1))`.
pub fn double_perturb(
    context: &ScalarContext,
    peer_perturbed: &ScalarCiphertext,
    r: &BlindingFactor,
) -> Result<ScalarCiphertext> {
    context.mul_plain(peer_perturbed, r.as_i64())
}

/// `E(r r' (d + 1)) - E(r r' (d' + 1)) = E(r r' (d - d'))`.
///
/// `own_doubled` is this silo's perturbed value as blinded by the partner,
/// `peer_doubled` the partner's value as blinded by this silo.
pub fn blinded_difference(
    context: &ScalarContext,
    own_doubled: &ScalarCiphertext,
    peer_doubled: &ScalarCiphertext,
) -> Result<ScalarCiphertext> {
    context.sub(own_doubled, peer_doubled)
}
