//! The coordinator's key pair.

use crate::he::{ParametersId, ScalarCiphertext, ScalarContext};
use crate::Result;
use fhe::bfv::{BfvParameters, Encoding, Plaintext, PublicKey, SecretKey};
use fhe_traits::{FheDecoder, FheDecrypter};
use rand::{CryptoRng, RngCore};
use std::fmt;
use std::sync::Arc;

/// Public and secret key of a coordinator session.
///
/// The secret key never leaves this struct and is zeroized when it is
/// dropped.
pub struct KeyPair {
    par: Arc<BfvParameters>,
    id: ParametersId,
    public: PublicKey,
    public_bytes: Vec<u8>,
    secret: SecretKey,
}

impl KeyPair {
    /// Generates a fresh key pair under the parameters of `context`.
    pub fn generate<R: RngCore + CryptoRng>(context: &ScalarContext, rng: &mut R) -> Self {
        let secret = SecretKey::random(context.parameters(), rng);
        let public = PublicKey::new(&secret, rng);
        let public_bytes = context.encode_public_key(&public);
        Self {
            par: context.parameters().clone(),
            id: context.id(),
            public,
            public_bytes,
            secret,
        }
    }

    /// The public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The serialized public key, as sent to silos.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_bytes
    }

    /// Decrypts a scalar to its centered representative in `[-t/2, t/2)`.
    pub fn decrypt(&self, c: &ScalarCiphertext) -> Result<i64> {
        c.parameters.ensure(self.id)?;
        let pt: Plaintext = self.secret.try_decrypt(&c.ct)?;
        let values = Vec::<i64>::try_decode(&pt, Encoding::poly())?;
        Ok(values.first().copied().unwrap_or_default())
    }

    /// The parameters the keys were generated under.
    pub fn parameters(&self) -> &Arc<BfvParameters> {
        &self.par
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("parameters", &self.id)
            .field("public_key", &format_args!("{} bytes", self.public_bytes.len()))
            .finish_non_exhaustive()
    }
}
