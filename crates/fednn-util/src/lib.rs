#![warn(missing_docs, unused_imports)]

//! Utilities for the fednn private nearest-neighbor protocol.

mod bench;
mod sampling;
pub mod timeit;

pub use bench::BenchLogger;
pub use sampling::{sample_blinding_factor, sample_vector};
