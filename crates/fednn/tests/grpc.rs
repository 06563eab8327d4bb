use fednn::config::{ProtocolConfig, Roster};
use fednn::dataset::{Dataset, VectorRecord};
use fednn::he::{KeyPair, ScalarContext, ScalarParameters};
use fednn::silo::{Query, SiloService};
use fednn::transport::{RemoteSilo, SiloServer, GrpcConnector};
use fednn::{DataHolder, Error, QueryUser};
use rand::thread_rng;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex};

fn config() -> ProtocolConfig {
    ProtocolConfig {
        dimension: 3,
        max_coordinate: 100,
        max_blinding_factor: 100,
    }
}

fn spawn_silo(
    id: usize,
    context: &ScalarContext,
    vectors: Vec<Vec<i64>>,
) -> Result<String, Box<dyn StdError>> {
    let records = vectors
        .into_iter()
        .enumerate()
        .map(|(j, v)| VectorRecord::new((10 * id + j) as i64, v))
        .collect();
    let holder = DataHolder::new(
        id,
        format!("silo{id}"),
        config(),
        context.clone(),
        Dataset::new(3, records)?,
    )?
    .with_connector(Arc::new(GrpcConnector));
    let server = SiloServer::bind("127.0.0.1:0", Arc::new(Mutex::new(holder)))?;
    let address = server.local_addr()?.to_string();
    server.spawn();
    Ok(address)
}

#[test]
fn query_over_loopback() -> Result<(), Box<dyn StdError>> {
    let context = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
    let datasets = vec![
        vec![vec![90, 90, 90], vec![70, 10, 10]],
        vec![vec![12, 11, 10], vec![0, 0, 0]],
        vec![vec![50, 50, 50]],
    ];
    let mut roster = format!("{}\n", datasets.len());
    for (i, vectors) in datasets.into_iter().enumerate() {
        let address = spawn_silo(i, &context, vectors)?;
        roster.push_str(&format!("{address} silo{i}\n"));
    }
    let roster = Roster::parse(&roster)?;

    let mut user = QueryUser::connect("user", config(), context, &roster, &GrpcConnector)?;
    let report = user.run_query(vec![10, 10, 10])?;
    assert_eq!(report.winner, 1);
    assert_eq!(report.answer, VectorRecord::new(10, vec![12, 11, 10]));
    assert_eq!(report.rounds, 2);

    let report = user.run_query(vec![80, 80, 80])?;
    assert_eq!(report.winner, 0);
    assert_eq!(report.answer.id, 0);
    assert_eq!(user.logger().queries(), 2);
    Ok(())
}

#[test]
fn remote_failures_keep_their_kind() -> Result<(), Box<dyn StdError>> {
    let context = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
    let address = spawn_silo(0, &context, vec![vec![1, 2, 3]])?;
    let mut silo = RemoteSilo::connect(&address)?;

    assert!(matches!(silo.fetch_answer(), Err(Error::ProtocolViolation(_))));
    let query = Query {
        values: vec![1, 2],
        public_key: vec![],
        peer_address: None,
        position: 0,
    };
    assert!(matches!(
        silo.receive_query(&query),
        Err(Error::Configuration(_))
    ));
    let other = ScalarContext::new(&ScalarParameters {
        plaintext_modulus: 1 << 40,
        ..ScalarParameters::insecure_for_tests()
    })?;
    let foreign = KeyPair::generate(&other, &mut thread_rng());
    let query = Query {
        values: vec![1, 2, 3],
        public_key: foreign.public_key_bytes().to_vec(),
        peer_address: None,
        position: 0,
    };
    assert!(matches!(
        silo.receive_query(&query),
        Err(Error::ParameterMismatch(_))
    ));
    silo.reset_query()?;
    Ok(())
}

#[test]
fn unreachable_silo() {
    assert!(matches!(
        RemoteSilo::connect("127.0.0.1:1"),
        Err(Error::Transport(_))
    ));
}
