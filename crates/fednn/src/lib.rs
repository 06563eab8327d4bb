#![warn(missing_docs, unused_imports)]

//! Private k=1 nearest-neighbor search over vectors held by several data
//! silos.
//!
//! A coordinator ([`orchestrator::QueryUser`]) encrypts under its own BFV key
//! and asks each silo ([`silo::DataHolder`]) for its local nearest record.
//! Silos compare their distances pairwise under multiplicative blinding, so
//! the coordinator only learns the sign of each comparison, and the winners
//! of each round meet again until one silo is left.

pub mod blinding;
pub mod config;
pub mod dataset;
mod errors;
pub mod he;
pub mod orchestrator;
pub mod proto;
pub mod silo;
pub mod topology;
pub mod transport;

pub use errors::{Error, Result};
pub use orchestrator::{ComparisonMode, QueryReport, QueryUser};
pub use silo::{DataHolder, SiloService};
