// Query user: connects to every data holder of a roster file, runs random
// nearest-neighbor queries and prints their cost.

use clap::Parser;
use console::style;
use fednn::config::Roster;
use fednn::he::{ScalarContext, ScalarParameters};
use fednn::transport::GrpcConnector;
use fednn::{ComparisonMode, QueryUser};
use fednn_node::cli::QueryUserArgs;
use fednn_node::{init_logging, install_shutdown_hook, log_parameters, FlushAndClose, UserApp};
use fednn_util::timeit;
use indicatif::HumanBytes;
use log::warn;
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let args = QueryUserArgs::parse();

    let parameters = ScalarParameters::default();
    log_parameters(&parameters);
    let config = args.protocol_config();
    config.validate(&parameters)?;

    let roster = Roster::from_path(&args.ip_file)?;
    println!("# Query user {} over {} data holders", style(&args.name).bold(), roster.len());
    for entry in roster.entries() {
        println!("\t{entry}");
    }

    let mode = ComparisonMode::from(args.mode);
    if mode == ComparisonMode::Plain {
        warn!("Plain mode: every silo distance is revealed to the query user");
    }

    let context = timeit!("Parameters generation", ScalarContext::new(&parameters)?);
    let user = timeit!(
        "Key generation and connection",
        QueryUser::connect(&args.name, config, context, &roster, &GrpcConnector)?
    )
    .with_mode(mode);

    let app = Arc::new(UserApp::new(user));
    install_shutdown_hook(app.clone())?;

    let mut rng = args.rng();
    for _ in 0..args.n {
        let report = app.run_random_query(&mut rng)?;
        println!("{report}");
        println!(
            "{} winner {} after {} round(s), {} exchanged",
            style("✔").green(),
            style(&report.winner_name).bold(),
            report.rounds,
            HumanBytes(report.communication)
        );
    }

    app.flush_and_close();
    Ok(())
}
