//! Scalar homomorphic encryption.
//!
//! A thin layer over the BFV scheme that encrypts a single integer per
//! ciphertext and only exposes the operations the protocol needs: addition,
//! subtraction, and multiplication by a plaintext integer.

mod ciphertext;
mod context;
mod keys;
mod parameters;

pub use ciphertext::{EncryptedScalar, ScalarCiphertext};
pub use context::ScalarContext;
pub use keys::KeyPair;
pub use parameters::{ParametersId, ScalarParameters};
