use crate::blinding::BlindingFactor;
use crate::dataset::Neighbor;
use crate::he::ScalarCiphertext;
use crate::{Error, Result};
use std::fmt;
use zeroize::Zeroize;

/// Where a silo stands in the processing of the current query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SiloPhase {
    /// No query in flight.
    #[default]
    Idle,
    /// Nearest neighbor computed.
    QueryReceived,
    /// Blinded distance computed.
    LocallyPerturbed,
    /// Partner's blinded distance received.
    Exchanged,
    /// Partner's blinded distance blinded again.
    DoublePerturbed,
    /// Answer handed out.
    AnswerPending,
}

impl fmt::Display for SiloPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-query secrets and progress of a silo.
#[derive(Debug, Default)]
pub struct SiloQueryState {
    pub(crate) phase: SiloPhase,
    pub(crate) query: Vec<i64>,
    pub(crate) nearest: Option<Neighbor>,
    pub(crate) blinding: Option<BlindingFactor>,
    pub(crate) own_perturbed: Option<ScalarCiphertext>,
    pub(crate) peer_perturbed: Option<ScalarCiphertext>,
    pub(crate) peer_address: Option<String>,
    pub(crate) position: usize,
}

impl SiloQueryState {
    /// Current phase.
    pub fn phase(&self) -> SiloPhase {
        self.phase
    }

    /// Cached nearest neighbor of the current query.
    pub fn nearest(&self) -> Option<&Neighbor> {
        self.nearest.as_ref()
    }

    /// Whether a blinding factor is held.
    pub fn has_blinding_factor(&self) -> bool {
        self.blinding.is_some()
    }

    /// Whether a partner value is held.
    pub fn has_peer_value(&self) -> bool {
        self.peer_perturbed.is_some()
    }

    /// Partner address for the current round.
    pub fn peer_address(&self) -> Option<&str> {
        self.peer_address.as_deref()
    }

    /// Position in the current round.
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn require(&self, operation: &str, allowed: &[SiloPhase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(Error::unexpected_state(operation, self.phase.to_string()))
        }
    }

    pub(crate) fn require_query(&self, operation: &str) -> Result<&Neighbor> {
        match (&self.phase, &self.nearest) {
            (SiloPhase::Idle, _) | (_, None) => {
                Err(Error::unexpected_state(operation, self.phase.to_string()))
            }
            (_, Some(nearest)) => Ok(nearest),
        }
    }

    pub(crate) fn clear(&mut self) {
        if let Some(r) = self.blinding.as_mut() {
            r.zeroize();
        }
        self.query.zeroize();
        *self = Self::default();
    }
}
