// Data holder: generates a synthetic dataset and serves it to query users and
// partner silos over gRPC until interrupted.

use clap::Parser;
use console::style;
use fednn::dataset::Dataset;
use fednn::he::{ScalarContext, ScalarParameters};
use fednn::transport::{SiloServer, GrpcConnector};
use fednn::DataHolder;
use fednn_node::cli::DataHolderArgs;
use fednn_node::{init_logging, install_shutdown_hook, log_parameters, SiloApp};
use fednn_util::timeit;
use indicatif::HumanBytes;
use log::info;
use std::error::Error;
use std::sync::{Arc, Mutex};

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = DataHolderArgs::parse();

    let parameters = ScalarParameters::default();
    log_parameters(&parameters);
    let config = args.protocol_config();
    config.validate(&parameters)?;

    let context = timeit!("Parameters generation", ScalarContext::new(&parameters)?);

    let mut rng = args.rng();
    let dataset = timeit!(
        "Dataset generation",
        Dataset::random(args.n, args.dim, args.max_coordinate, &mut rng)?
    );
    println!(
        "# Data holder #{} {}: {} records of dimension {} ({})",
        args.id,
        style(&args.name).bold(),
        dataset.len(),
        dataset.dimension(),
        HumanBytes((dataset.len() * dataset.dimension() * 8) as u64)
    );

    let holder = DataHolder::new(args.id as usize, &args.name, config, context, dataset)?
        .with_connector(Arc::new(GrpcConnector));
    let silo = Arc::new(Mutex::new(holder));
    let server = SiloServer::bind((args.ip.as_str(), args.port), silo.clone())?;
    info!("Data holder {} ready on {}", args.name, server.local_addr()?);

    let app = Arc::new(SiloApp::new(silo));
    install_shutdown_hook(app)?;
    server.serve()?;
    Ok(())
}
