//! How parties reach a silo: in-process for tests and single-process demos,
//! or over gRPC.

mod grpc;
mod local;

pub use grpc::{GrpcConnector, RemoteSilo, SiloServer};
pub use local::{LocalNetwork, LocalSilo, SharedSilo};

use crate::silo::SiloService;
use crate::Result;

/// Resolves a silo address to a client.
pub trait SiloConnector: Send + Sync {
    /// Opens a client to the silo at `address`.
    fn connect(&self, address: &str) -> Result<Box<dyn SiloService>>;
}
