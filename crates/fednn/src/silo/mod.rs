//! The operations a silo offers, and the data holder that implements them.

mod data_holder;
mod state;

pub use data_holder::DataHolder;
pub use state::{SiloPhase, SiloQueryState};

use crate::dataset::VectorRecord;
use crate::he::EncryptedScalar;
use crate::Result;

/// A query as seen by a silo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// The query vector.
    pub values: Vec<i64>,
    /// Serialized coordinator public key; empty keeps the key already loaded.
    pub public_key: Vec<u8>,
    /// Address of the pair partner for the current round, if any.
    pub peer_address: Option<String>,
    /// Position of the silo in the current round; even positions initiate.
    pub position: usize,
}

impl Query {
    /// Number of coordinates.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Encrypted, blinded difference of the two distances of a pair, returned by
/// the initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairComparison {
    /// `E(r r' (d_initiator - d_responder))`.
    pub delta: EncryptedScalar,
    /// Bytes exchanged between the two silos to produce `delta`.
    pub peer_communication: u64,
}

/// Remote operations of a silo.
///
/// A silo serves one query at a time and walks through the states of
/// [`SiloPhase`]; an operation invoked in a state that does not allow it fails
/// with [`crate::Error::ProtocolViolation`] and leaves the state untouched.
pub trait SiloService: Send {
    /// Loads the public key, checks the query vector and runs the local
    /// nearest-neighbor search.
    fn receive_query(&mut self, query: &Query) -> Result<()>;

    /// Encrypts the local distance and blinds it with a fresh factor.
    fn compute_perturbed_distance(&mut self, query: &Query) -> Result<EncryptedScalar>;

    /// Returns the encrypted local distance without blinding.
    fn fetch_encrypted_distance(&mut self) -> Result<EncryptedScalar>;

    /// Called by the pair initiator on its responder: stores the initiator's
    /// perturbed distance and returns the responder's own.
    fn exchange_perturbed_distance(&mut self, peer: &EncryptedScalar) -> Result<EncryptedScalar>;

    /// Blinds the stored partner value with this silo's factor.
    fn fetch_double_perturbed_distance(&mut self) -> Result<EncryptedScalar>;

    /// Runs the exchange with the partner and returns the blinded
    /// difference. Only served by the initiator of a pair.
    fn compare_perturbed_distance(&mut self) -> Result<PairComparison>;

    /// Returns the local nearest neighbor.
    fn fetch_answer(&mut self) -> Result<VectorRecord>;

    /// Clears all per-query state.
    fn reset_query(&mut self) -> Result<()>;
}
