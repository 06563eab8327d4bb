//! Scalar encryption parameters and their fingerprint.

use crate::{Error, Result};
use fhe::bfv::{BfvParameters, BfvParametersBuilder};
use fhe_traits::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Short identifier of a parameter set: the first eight bytes of the SHA-256
/// digest of its serialization.
///
/// Every ciphertext and public key that crosses a process boundary carries the
/// identifier of the parameters it was produced under, so that data from an
/// incompatible parameter set is rejected instead of silently decoding to
/// garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParametersId(u64);

impl ParametersId {
    /// Computes the identifier of `par`.
    pub fn of(par: &BfvParameters) -> Self {
        let digest = Sha256::digest(par.to_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(prefix))
    }

    /// Wraps a raw identifier read from the wire.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Fails with [`Error::ParameterMismatch`] unless `self == expected`.
    pub fn ensure(&self, expected: ParametersId) -> Result<()> {
        if *self == expected {
            Ok(())
        } else {
            Err(Error::fingerprint_mismatch(self.0, expected.0))
        }
    }
}

impl fmt::Display for ParametersId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Choice of ring degree, plaintext modulus and ciphertext moduli.
///
/// All parties of a deployment must agree on the same values; the
/// coordinator's public key is only usable by silos that built the exact same
/// set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarParameters {
    /// Ring degree, a power of two.
    pub degree: usize,
    /// Plaintext modulus `t`; decrypted values are centered in `[-t/2, t/2)`.
    pub plaintext_modulus: u64,
    /// Bit sizes of the ciphertext moduli.
    pub moduli_sizes: Vec<usize>,
}

impl Default for ScalarParameters {
    /// Ring degree 8192, three 62-bit moduli and `t = 2^42`.
    fn default() -> Self {
        Self {
            degree: 8192,
            plaintext_modulus: 1 << 42,
            moduli_sizes: vec![62, 62, 62],
        }
    }
}

impl ScalarParameters {
    /// A small ring for tests and local demonstrations.
    ///
    /// Offers no security; the plaintext modulus matches the default so that
    /// every default protocol bound still holds.
    pub fn insecure_for_tests() -> Self {
        Self {
            degree: 64,
            plaintext_modulus: 1 << 42,
            moduli_sizes: vec![62, 62],
        }
    }

    /// Largest magnitude that survives a decryption, `floor((t - 1) / 2)`.
    pub fn max_magnitude(&self) -> u64 {
        self.plaintext_modulus.saturating_sub(1) / 2
    }

    /// Builds the parameters; fails on an invalid degree or modulus.
    pub fn build(&self) -> Result<Arc<BfvParameters>> {
        if self.plaintext_modulus < 2 {
            return Err(Error::unsafe_parameters(format!(
                "plaintext modulus {} is too small",
                self.plaintext_modulus
            )));
        }
        Ok(BfvParametersBuilder::new()
            .set_degree(self.degree)
            .set_plaintext_modulus(self.plaintext_modulus)
            .set_moduli_sizes(&self.moduli_sizes)
            .build_arc()?)
    }
}

#[cfg(test)]
mod tests {
    use super::{ParametersId, ScalarParameters};
    use crate::Error;

    #[test]
    fn default_values() {
        let p = ScalarParameters::default();
        assert_eq!(p.degree, 8192);
        assert_eq!(p.plaintext_modulus, 1 << 42);
        assert_eq!(p.moduli_sizes, vec![62, 62, 62]);
        assert_eq!(p.max_magnitude(), (1 << 41) - 1);
    }

    #[test]
    fn fingerprint_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let a = ScalarParameters::insecure_for_tests().build()?;
        let b = ScalarParameters::insecure_for_tests().build()?;
        assert_eq!(ParametersId::of(&a), ParametersId::of(&b));
        ParametersId::of(&a).ensure(ParametersId::of(&b))?;
        Ok(())
    }

    #[test]
    fn fingerprint_separates_parameter_sets() -> Result<(), Box<dyn std::error::Error>> {
        let a = ScalarParameters::insecure_for_tests().build()?;
        let b = ScalarParameters {
            plaintext_modulus: 1 << 40,
            ..ScalarParameters::insecure_for_tests()
        }
        .build()?;
        let (ia, ib) = (ParametersId::of(&a), ParametersId::of(&b));
        assert_ne!(ia, ib);
        assert!(matches!(ia.ensure(ib), Err(Error::ParameterMismatch(_))));
        Ok(())
    }

    #[test]
    fn invalid_degree_is_rejected() {
        let p = ScalarParameters {
            degree: 100,
            ..ScalarParameters::insecure_for_tests()
        };
        assert!(matches!(p.build(), Err(Error::Encryption(_))));

        let p = ScalarParameters {
            plaintext_modulus: 1,
            ..ScalarParameters::insecure_for_tests()
        };
        assert!(matches!(p.build(), Err(Error::Configuration(_))));
    }
}
