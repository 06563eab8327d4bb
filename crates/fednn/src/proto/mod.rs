//! Protobuf messages exchanged between coordinator and silos.
//!
//! `generated.rs` holds the prost messages and the tonic client and server
//! of the `DataHolder` service, produced from `fednn.proto` and checked in.

#[allow(clippy::all)]
mod generated;
mod conversions;

pub use conversions::WireSize;
pub use generated::*;
