#![warn(missing_docs, unused_imports)]

//! Executables of the fednn protocol: `data-holder` serves one silo over gRPC,
//! `query-user` connects to every silo of a roster and runs queries.

mod app;
pub mod cli;

pub use app::{install_shutdown_hook, log_parameters, FlushAndClose, SiloApp, UserApp};

/// Initializes `env_logger`, at level `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
