//! Encrypted scalars and their wire form.

use crate::he::ParametersId;
use crate::proto::ParametrizedBlob;
use fhe::bfv::Ciphertext;
use fhe_traits::Serialize;
use prost::Message;
use std::fmt;

/// A ciphertext encrypting a single integer, tagged with the identifier of
/// the parameters it lives under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarCiphertext {
    pub(crate) parameters: ParametersId,
    pub(crate) ct: Ciphertext,
}

impl ScalarCiphertext {
    pub(crate) fn new(parameters: ParametersId, ct: Ciphertext) -> Self {
        Self { parameters, ct }
    }

    /// Identifier of the parameters this ciphertext was produced under.
    pub fn parameters_id(&self) -> ParametersId {
        self.parameters
    }

    /// Serializes into the opaque form exchanged between parties.
    pub fn to_encrypted(&self) -> EncryptedScalar {
        EncryptedScalar(
            ParametrizedBlob {
                parameters_id: self.parameters.raw(),
                payload: self.ct.to_bytes(),
            }
            .encode_to_vec(),
        )
    }
}

/// Opaque serialized ciphertext. Only a party holding the matching
/// parameters can turn it back into a [`ScalarCiphertext`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncryptedScalar(Vec<u8>);

impl EncryptedScalar {
    /// Wraps bytes received from a peer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the scalar and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no bytes are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncryptedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedScalar({} bytes)", self.0.len())
    }
}

impl From<&ScalarCiphertext> for EncryptedScalar {
    fn from(value: &ScalarCiphertext) -> Self {
        value.to_encrypted()
    }
}
