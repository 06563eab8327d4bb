use crate::dataset::VectorRecord;
use crate::he::EncryptedScalar;
use crate::silo::{DataHolder, PairComparison, Query, SiloService};
use crate::transport::SiloConnector;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// A silo shared between the threads that serve it.
pub type SharedSilo = Arc<Mutex<DataHolder>>;

/// In-process registry of silos, addressed by name.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    silos: RwLock<HashMap<String, SharedSilo>>,
}

impl LocalNetwork {
    /// Creates an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `silo` under `address`, replacing any previous one.
    pub fn register(&self, address: impl Into<String>, silo: DataHolder) -> Result<SharedSilo> {
        let shared = Arc::new(Mutex::new(silo));
        self.silos
            .write()
            .map_err(|_| Error::Transport("Local network registry is poisoned".to_string()))?
            .insert(address.into(), shared.clone());
        Ok(shared)
    }

    /// The silo registered under `address`.
    pub fn silo(&self, address: &str) -> Option<SharedSilo> {
        self.silos.read().ok()?.get(address).cloned()
    }

    /// A connector resolving addresses against this network.
    ///
    /// The connector only holds a weak reference, so silos may keep one
    /// without keeping the network alive.
    pub fn connector(self: &Arc<Self>) -> Arc<dyn SiloConnector> {
        Arc::new(LocalConnector {
            network: Arc::downgrade(self),
        })
    }
}

struct LocalConnector {
    network: Weak<LocalNetwork>,
}

impl SiloConnector for LocalConnector {
    fn connect(&self, address: &str) -> Result<Box<dyn SiloService>> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| Error::unreachable(address, "the local network is gone"))?;
        let silo = network
            .silo(address)
            .ok_or_else(|| Error::unreachable(address, "no such silo"))?;
        Ok(Box::new(LocalSilo::new(address, silo)))
    }
}

/// Client to an in-process silo. Every call locks the silo for its duration.
pub struct LocalSilo {
    address: String,
    silo: SharedSilo,
}

impl LocalSilo {
    /// Creates a client to `silo`.
    pub fn new(address: impl Into<String>, silo: SharedSilo) -> Self {
        Self {
            address: address.into(),
            silo,
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut DataHolder) -> Result<T>) -> Result<T> {
        let mut guard = self
            .silo
            .lock()
            .map_err(|_| Error::unreachable(&self.address, "the silo panicked"))?;
        f(&mut guard)
    }
}

impl SiloService for LocalSilo {
    fn receive_query(&mut self, query: &Query) -> Result<()> {
        self.with(|s| s.receive_query(query))
    }

    fn compute_perturbed_distance(&mut self, query: &Query) -> Result<EncryptedScalar> {
        self.with(|s| s.compute_perturbed_distance(query))
    }

    fn fetch_encrypted_distance(&mut self) -> Result<EncryptedScalar> {
        self.with(|s| s.fetch_encrypted_distance())
    }

    fn exchange_perturbed_distance(&mut self, peer: &EncryptedScalar) -> Result<EncryptedScalar> {
        self.with(|s| s.exchange_perturbed_distance(peer))
    }

    fn fetch_double_perturbed_distance(&mut self) -> Result<EncryptedScalar> {
        self.with(|s| s.fetch_double_perturbed_distance())
    }

    fn compare_perturbed_distance(&mut self) -> Result<PairComparison> {
        self.with(|s| s.compare_perturbed_distance())
    }

    fn fetch_answer(&mut self) -> Result<VectorRecord> {
        self.with(|s| s.fetch_answer())
    }

    fn reset_query(&mut self) -> Result<()> {
        self.with(|s| s.reset_query())
    }
}

#[cfg(test)]
mod tests {
    use super::LocalNetwork;
    use crate::Error;

    #[test]
    fn unknown_address() {
        let network = LocalNetwork::new();
        let connector = network.connector();
        assert!(matches!(
            connector.connect("nowhere"),
            Err(Error::Transport(_))
        ));
        assert!(network.silo("nowhere").is_none());
    }

    #[test]
    fn dropped_network() {
        let connector = LocalNetwork::new().connector();
        assert!(matches!(connector.connect("a"), Err(Error::Transport(_))));
    }
}
