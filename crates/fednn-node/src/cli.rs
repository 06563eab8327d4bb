//! Command-line options of the two executables.

use clap::{Parser, ValueEnum};
use fednn::config::ProtocolConfig;
use fednn::ComparisonMode;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

/// Options of `data-holder`.
#[derive(Debug, Parser)]
#[command(name = "data-holder", about = "Serve a private dataset to the nearest-neighbor protocol")]
pub struct DataHolderArgs {
    /// Identifier of the silo.
    #[arg(long)]
    pub id: u32,

    /// Address to listen on.
    #[arg(long)]
    pub ip: String,

    /// Port to listen on.
    #[arg(long)]
    pub port: u16,

    /// Display name of the silo.
    #[arg(long)]
    pub name: String,

    /// Number of synthetic records.
    #[arg(long, default_value_t = 500)]
    pub n: usize,

    /// Dimension of the vectors.
    #[arg(long, default_value_t = 128)]
    pub dim: usize,

    /// Largest coordinate value.
    #[arg(long, default_value_t = 100)]
    pub max_coordinate: i64,

    /// Seed of the dataset generator; random when absent.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl DataHolderArgs {
    /// The protocol bounds selected on the command line.
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            dimension: self.dim,
            max_coordinate: self.max_coordinate,
            ..ProtocolConfig::default()
        }
    }

    /// Random generator for the dataset.
    pub fn rng(&self) -> ChaCha8Rng {
        seeded(self.seed)
    }
}

/// Comparison mode, as spelled on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Pairwise blinded comparison.
    #[default]
    Blinded,
    /// Decrypt every distance. Leaks all distances to the query user.
    Plain,
}

impl From<Mode> for ComparisonMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Blinded => ComparisonMode::Blinded,
            Mode::Plain => ComparisonMode::Plain,
        }
    }
}

/// Options of `query-user`.
#[derive(Debug, Parser)]
#[command(name = "query-user", about = "Run nearest-neighbor queries across data holders")]
pub struct QueryUserArgs {
    /// Roster file: the silo count, then one `<address> <name>` line per silo.
    #[arg(long)]
    pub ip_file: PathBuf,

    /// Display name of the query user.
    #[arg(long)]
    pub name: String,

    /// Number of random queries to run.
    #[arg(long, default_value_t = 1)]
    pub n: usize,

    /// Dimension of the vectors.
    #[arg(long, default_value_t = 128)]
    pub dim: usize,

    /// How silo distances are compared.
    #[arg(long, value_enum, default_value_t = Mode::Blinded)]
    pub mode: Mode,

    /// Seed of the query generator; random when absent.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl QueryUserArgs {
    /// The protocol bounds selected on the command line.
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig::with_dimension(self.dim)
    }

    /// Random generator for the queries.
    pub fn rng(&self) -> ChaCha8Rng {
        seeded(self.seed)
    }
}

fn seeded(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}
