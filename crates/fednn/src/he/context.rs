//! Homomorphic operations on encrypted scalars.

use crate::he::{EncryptedScalar, ParametersId, ScalarCiphertext, ScalarParameters};
use crate::proto::ParametrizedBlob;
use crate::{Error, Result};
use fhe::bfv::{BfvParameters, Ciphertext, Encoding, Plaintext, PublicKey};
use fhe_traits::{DeserializeParametrized, FheEncoder, FheEncrypter, Serialize};
use prost::Message;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

/// Evaluation context shared by every party: the built parameters and their
/// identifier.
///
/// A context never holds a secret key. It encrypts under a public key and
/// combines ciphertexts, checking that every operand was produced under its
/// own parameters before touching it.
#[derive(Debug, Clone)]
pub struct ScalarContext {
    par: Arc<BfvParameters>,
    id: ParametersId,
}

impl ScalarContext {
    /// Builds the parameters and derives their identifier.
    pub fn new(parameters: &ScalarParameters) -> Result<Self> {
        Ok(Self::from_bfv(parameters.build()?))
    }

    /// Wraps already-built parameters.
    pub fn from_bfv(par: Arc<BfvParameters>) -> Self {
        let id = ParametersId::of(&par);
        Self { par, id }
    }

    /// The underlying parameters.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }

    /// Identifier of the underlying parameters.
    pub fn id(&self) -> ParametersId {
        self.id
    }

    /// Plaintext modulus `t`.
    pub fn plaintext_modulus(&self) -> u64 {
        self.par.plaintext()
    }

    /// Largest magnitude that decrypts to itself.
    pub fn max_magnitude(&self) -> u64 {
        (self.par.plaintext() - 1) / 2
    }

    fn encode(&self, value: i64) -> Result<Plaintext> {
        Ok(Plaintext::try_encode(
            std::slice::from_ref(&value),
            Encoding::poly(),
            &self.par,
        )?)
    }

    fn check(&self, c: &ScalarCiphertext) -> Result<()> {
        c.parameters.ensure(self.id)
    }

    /// Encrypts `value` under `pk`. Values are reduced modulo `t`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        pk: &PublicKey,
        value: i64,
        rng: &mut R,
    ) -> Result<ScalarCiphertext> {
        let pt = self.encode(value)?;
        let ct: Ciphertext = pk.try_encrypt(&pt, rng)?;
        Ok(ScalarCiphertext::new(self.id, ct))
    }

    /// `E(a) + E(b) = E(a + b)`.
    pub fn add(&self, a: &ScalarCiphertext, b: &ScalarCiphertext) -> Result<ScalarCiphertext> {
        self.check(a)?;
        self.check(b)?;
        Ok(ScalarCiphertext::new(self.id, &a.ct + &b.ct))
    }

    /// `E(a) - E(b) = E(a - b)`.
    pub fn sub(&self, a: &ScalarCiphertext, b: &ScalarCiphertext) -> Result<ScalarCiphertext> {
        self.check(a)?;
        self.check(b)?;
        Ok(ScalarCiphertext::new(self.id, &a.ct - &b.ct))
    }

    /// `E(a) * k = E(a * k)` for a plaintext integer `k`.
    pub fn mul_plain(&self, a: &ScalarCiphertext, k: i64) -> Result<ScalarCiphertext> {
        self.check(a)?;
        let pt = self.encode(k)?;
        Ok(ScalarCiphertext::new(self.id, &a.ct * &pt))
    }

    /// Restores a ciphertext received from a peer.
    pub fn decode(&self, encrypted: &EncryptedScalar) -> Result<ScalarCiphertext> {
        let blob = self.unwrap_blob(encrypted.as_bytes())?;
        let ct = Ciphertext::from_bytes(&blob.payload, &self.par)?;
        Ok(ScalarCiphertext::new(self.id, ct))
    }

    /// Serializes a public key together with the parameters identifier.
    pub fn encode_public_key(&self, pk: &PublicKey) -> Vec<u8> {
        ParametrizedBlob {
            parameters_id: self.id.raw(),
            payload: pk.to_bytes(),
        }
        .encode_to_vec()
    }

    /// Restores a public key produced by [`Self::encode_public_key`].
    pub fn decode_public_key(&self, bytes: &[u8]) -> Result<PublicKey> {
        let blob = self.unwrap_blob(bytes)?;
        Ok(PublicKey::from_bytes(&blob.payload, &self.par)?)
    }

    fn unwrap_blob(&self, bytes: &[u8]) -> Result<ParametrizedBlob> {
        let blob =
            ParametrizedBlob::decode(bytes).map_err(|e| Error::malformed(e.to_string()))?;
        ParametersId::from_raw(blob.parameters_id).ensure(self.id)?;
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use crate::he::{EncryptedScalar, KeyPair, ScalarContext, ScalarParameters};
    use crate::Error;
    use proptest::prelude::*;
    use rand::thread_rng;
    use std::error::Error as StdError;

    /// `floor((t - 1) / 2)` for the test parameters.
    const MAX: i64 = (1 << 41) - 1;

    fn context() -> ScalarContext {
        ScalarContext::new(&ScalarParameters::insecure_for_tests()).unwrap()
    }

    #[test]
    fn encrypt_decrypt() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let ctx = context();
        let keys = KeyPair::generate(&ctx, &mut rng);
        for v in [0i64, 1, -1, 42, -12345, 1 << 40, -(1 << 40)] {
            let c = ctx.encrypt(keys.public_key(), v, &mut rng)?;
            assert_eq!(keys.decrypt(&c)?, v);
        }
        Ok(())
    }

    #[test]
    fn centered_range_edges() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let ctx = context();
        let keys = KeyPair::generate(&ctx, &mut rng);
        let half = (ctx.plaintext_modulus() / 2) as i64;
        assert_eq!(ctx.max_magnitude() as i64, MAX);

        let c = ctx.encrypt(keys.public_key(), half, &mut rng)?;
        assert_eq!(keys.decrypt(&c)?, -half);
        let c = ctx.encrypt(keys.public_key(), -half, &mut rng)?;
        assert_eq!(keys.decrypt(&c)?, -half);
        let c = ctx.encrypt(keys.public_key(), half - 1, &mut rng)?;
        assert_eq!(keys.decrypt(&c)?, half - 1);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]
        #[test]
        fn decrypt_inverts_encrypt(v in -MAX..=MAX) {
            let mut rng = thread_rng();
            let ctx = context();
            let keys = KeyPair::generate(&ctx, &mut rng);
            prop_assert!(v.unsigned_abs() <= ctx.max_magnitude());
            let c = ctx.encrypt(keys.public_key(), v, &mut rng).unwrap();
            prop_assert_eq!(keys.decrypt(&c).unwrap(), v);
        }
    }

    #[test]
    fn homomorphic_operations() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let ctx = context();
        let keys = KeyPair::generate(&ctx, &mut rng);
        let a = ctx.encrypt(keys.public_key(), 1234, &mut rng)?;
        let b = ctx.encrypt(keys.public_key(), 99, &mut rng)?;

        assert_eq!(keys.decrypt(&ctx.add(&a, &b)?)?, 1333);
        assert_eq!(keys.decrypt(&ctx.sub(&b, &a)?)?, -1135);
        assert_eq!(keys.decrypt(&ctx.mul_plain(&a, 100)?)?, 123_400);
        assert_eq!(keys.decrypt(&ctx.mul_plain(&b, -3)?)?, -297);
        Ok(())
    }

    #[test]
    fn wire_form_round_trips() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let ctx = context();
        let keys = KeyPair::generate(&ctx, &mut rng);

        let pk = ctx.decode_public_key(&keys.public_key_bytes())?;
        let c = ctx.encrypt(&pk, 77, &mut rng)?;
        let restored = ctx.decode(&c.to_encrypted())?;
        assert_eq!(restored, c);
        assert_eq!(keys.decrypt(&restored)?, 77);
        Ok(())
    }

    #[test]
    fn foreign_parameters_are_rejected() -> Result<(), Box<dyn StdError>> {
        let mut rng = thread_rng();
        let ctx = context();
        let other = ScalarContext::new(&ScalarParameters {
            plaintext_modulus: 1 << 40,
            ..ScalarParameters::insecure_for_tests()
        })?;
        let keys = KeyPair::generate(&ctx, &mut rng);
        let foreign_keys = KeyPair::generate(&other, &mut rng);

        let c = ctx.encrypt(keys.public_key(), 5, &mut rng)?;
        let foreign = other.encrypt(foreign_keys.public_key(), 5, &mut rng)?;

        assert!(matches!(
            other.decode(&c.to_encrypted()),
            Err(Error::ParameterMismatch(_))
        ));
        assert!(matches!(
            ctx.decode_public_key(&foreign_keys.public_key_bytes()),
            Err(Error::ParameterMismatch(_))
        ));
        assert!(matches!(
            ctx.add(&c, &foreign),
            Err(Error::ParameterMismatch(_))
        ));
        assert!(matches!(
            keys.decrypt(&foreign),
            Err(Error::ParameterMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        let ctx = context();
        let garbage = EncryptedScalar::from_bytes(vec![0xff; 7]);
        assert!(ctx.decode(&garbage).is_err());
        assert!(ctx.decode(&EncryptedScalar::default()).is_err());
    }
}
