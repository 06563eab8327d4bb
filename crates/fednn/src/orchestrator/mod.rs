//! The coordinator: drives each query across every silo of the roster.

mod report;

pub use report::QueryReport;

use crate::config::{validate_bounds, validate_safe_range, ProtocolConfig, Roster, RosterEntry};
use crate::dataset::VectorRecord;
use crate::he::{KeyPair, ScalarContext};
use crate::proto::WireSize;
use crate::silo::{Query, SiloService};
use crate::topology::{pair, Match, Tournament};
use crate::transport::SiloConnector;
use crate::{Error, Result};
use fednn_util::{sample_vector, BenchLogger};
use log::{debug, error, info, warn};
use rand::{thread_rng, Rng};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// How the coordinator compares silo distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Pairwise blinded comparison; only signs of differences are learned.
    #[default]
    Blinded,
    /// Every silo returns its encrypted distance, which the coordinator
    /// decrypts. Leaks every distance; kept as a baseline.
    Plain,
}

impl FromStr for ComparisonMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blinded" => Ok(Self::Blinded),
            "plain" => Ok(Self::Plain),
            _ => Err(Error::Configuration(format!("Unknown comparison mode {s:?}"))),
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blinded => f.write_str("blinded"),
            Self::Plain => f.write_str("plain"),
        }
    }
}

/// A silo of the roster and the client reaching it.
pub struct SiloHandle {
    entry: RosterEntry,
    client: Box<dyn SiloService>,
}

impl SiloHandle {
    /// Pairs a roster entry with its client.
    pub fn new(entry: RosterEntry, client: Box<dyn SiloService>) -> Self {
        Self { entry, client }
    }

    /// The roster entry.
    pub fn entry(&self) -> &RosterEntry {
        &self.entry
    }
}

/// Runs `f` on every silo concurrently and waits for all of them.
fn fan_out<T, F>(silos: &mut [SiloHandle], f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &mut SiloHandle) -> Result<T> + Sync + Send,
{
    silos
        .par_iter_mut()
        .enumerate()
        .map(|(i, silo)| f(i, silo))
        .collect()
}

/// The querying party. Owns the session key pair and one client per silo.
pub struct QueryUser {
    name: String,
    config: ProtocolConfig,
    context: ScalarContext,
    keys: KeyPair,
    mode: ComparisonMode,
    silos: Vec<SiloHandle>,
    queries: u64,
    logger: BenchLogger,
}

impl QueryUser {
    /// Creates a coordinator over `silos`, in roster order, and generates the
    /// session keys.
    pub fn new(
        name: impl Into<String>,
        config: ProtocolConfig,
        context: ScalarContext,
        silos: Vec<SiloHandle>,
    ) -> Result<Self> {
        validate_bounds(&config)?;
        validate_safe_range(&config, context.plaintext_modulus())?;
        if silos.is_empty() {
            return Err(Error::Configuration("No silo to query".to_string()));
        }
        let keys = KeyPair::generate(&context, &mut thread_rng());
        Ok(Self {
            name: name.into(),
            config,
            context,
            keys,
            mode: ComparisonMode::default(),
            silos,
            queries: 0,
            logger: BenchLogger::new(),
        })
    }

    /// Connects to every silo of `roster` through `connector`.
    pub fn connect(
        name: impl Into<String>,
        config: ProtocolConfig,
        context: ScalarContext,
        roster: &Roster,
        connector: &dyn SiloConnector,
    ) -> Result<Self> {
        let silos = roster
            .entries()
            .iter()
            .map(|entry| {
                let client = connector.connect(&entry.address)?;
                info!("Connected to {entry}");
                Ok(SiloHandle::new(entry.clone(), client))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, config, context, silos)
    }

    /// Sets the comparison mode.
    pub fn with_mode(mut self, mode: ComparisonMode) -> Self {
        self.mode = mode;
        self
    }

    /// Name of the coordinator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The comparison mode.
    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// The silos, in roster order.
    pub fn silos(&self) -> &[SiloHandle] {
        &self.silos
    }

    /// Session-wide counters.
    pub fn logger(&self) -> &BenchLogger {
        &self.logger
    }

    /// Summary of the session counters, for the shutdown report.
    pub fn report(&self) -> String {
        format!(
            "-------------- Service Log --------------\n{}",
            self.logger
        )
    }

    /// Samples a query vector and runs it.
    pub fn run_random_query<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<QueryReport> {
        let values = sample_vector(self.config.dimension, self.config.max_coordinate, rng);
        self.run_query(values)
    }

    /// Finds the silo holding the record nearest to `values` and returns it.
    ///
    /// Any failed call abandons the query: every silo is then asked to reset
    /// and the error is returned.
    pub fn run_query(&mut self, values: Vec<i64>) -> Result<QueryReport> {
        self.config.check_vector(&values)?;
        self.queries += 1;
        let query_id = self.queries;
        self.logger.start_timer();

        let outcome = self.resolve(&values);
        let elapsed = self.logger.stop_timer();

        match outcome {
            Ok((winner, rounds, answer, communication)) => {
                self.logger.add_communication(communication as usize);
                self.logger.record_query();
                let report = QueryReport {
                    query_id,
                    winner,
                    winner_name: self.silos[winner].entry.name.clone(),
                    answer,
                    elapsed,
                    communication,
                    rounds,
                };
                info!(
                    "Query #{query_id} answered by silo {} in {} round(s)",
                    report.winner_name, rounds
                );
                Ok(report)
            }
            Err(e) => {
                error!("Query #{query_id} aborted: {e}");
                self.abort();
                Err(e)
            }
        }
    }

    fn resolve(&mut self, values: &[i64]) -> Result<(usize, usize, VectorRecord, u64)> {
        let (winner, rounds, mut communication) = match self.mode {
            ComparisonMode::Blinded => self.blinded(values)?,
            ComparisonMode::Plain => self.plain(values)?,
        };

        let answer = self.silos[winner].client.fetch_answer()?;
        communication += answer.wire_size() as u64;

        fan_out(&mut self.silos, |_, silo| silo.client.reset_query())?;
        Ok((winner, rounds, answer, communication))
    }

    fn query(&self, values: &[i64], position: usize) -> Query {
        Query {
            values: values.to_vec(),
            public_key: self.keys.public_key_bytes().to_vec(),
            peer_address: self
                .silos
                .get(pair(position))
                .map(|s| s.entry.address.clone()),
            position,
        }
    }

    fn blinded(&mut self, values: &[i64]) -> Result<(usize, usize, u64)> {
        let queries: Vec<Query> = (0..self.silos.len())
            .map(|i| self.query(values, i))
            .collect();
        let addresses: Vec<String> = self
            .silos
            .iter()
            .map(|s| s.entry.address.clone())
            .collect();

        let mut communication: u64 = fan_out(&mut self.silos, |i, silo| {
            let query = &queries[i];
            silo.client.receive_query(query)?;
            let perturbed = silo.client.compute_perturbed_distance(query)?;
            Ok((2 * query.wire_size() + perturbed.wire_size()) as u64)
        })?
        .into_iter()
        .sum();

        let mut tournament = Tournament::new(self.silos.len());
        while tournament.winner().is_none() {
            if tournament.round() > 0 {
                communication += self.reblind(values, &tournament, &addresses)?;
            }

            let initiators: Vec<bool> = (0..self.silos.len())
                .map(|silo| {
                    tournament
                        .matches()
                        .iter()
                        .any(|m| matches!(m, Match::Pair { initiator, .. } if *initiator == silo))
                })
                .collect();
            let comparisons = fan_out(&mut self.silos, |i, silo| {
                if initiators[i] {
                    silo.client.compare_perturbed_distance().map(Some)
                } else {
                    Ok(None)
                }
            })?;

            let mut initiator_wins = vec![None; self.silos.len()];
            for (i, comparison) in comparisons.into_iter().enumerate() {
                if let Some(c) = comparison {
                    communication += c.wire_size() as u64 + c.peer_communication;
                    let delta = self.keys.decrypt(&self.context.decode(&c.delta)?)?;
                    // Ties go to the initiator, the lower roster index.
                    initiator_wins[i] = Some(delta <= 0);
                }
            }
            let round = tournament.round();
            tournament.play(|initiator, responder| {
                let wins = initiator_wins[initiator].ok_or_else(|| {
                    Error::ProtocolViolation(format!("Silo {initiator} returned no comparison"))
                })?;
                let (winner, loser) = if wins {
                    (initiator, responder)
                } else {
                    (responder, initiator)
                };
                debug!("Round {round}: silo {winner} beats silo {loser}");
                Ok::<_, Error>(wins)
            })?;
        }

        let winner = tournament
            .winner()
            .ok_or_else(|| Error::ProtocolViolation("The tournament has no winner".to_string()))?;
        Ok((winner, tournament.round(), communication))
    }

    /// Sends the query again to the survivors of a tournament round, with
    /// their new positions and partners, so that each samples a fresh factor.
    fn reblind(&mut self, values: &[i64], tournament: &Tournament, addresses: &[String]) -> Result<u64> {
        let queries: Vec<Option<Query>> = (0..self.silos.len())
            .map(|silo| {
                tournament.position(silo).map(|position| Query {
                    values: values.to_vec(),
                    public_key: vec![],
                    peer_address: tournament
                        .partner(silo)
                        .map(|partner| addresses[partner].clone()),
                    position,
                })
            })
            .collect();
        let sizes = fan_out(&mut self.silos, |i, silo| match &queries[i] {
            Some(query) => {
                let perturbed = silo.client.compute_perturbed_distance(query)?;
                Ok((query.wire_size() + perturbed.wire_size()) as u64)
            }
            None => Ok(0),
        })?;
        Ok(sizes.into_iter().sum())
    }

    fn plain(&mut self, values: &[i64]) -> Result<(usize, usize, u64)> {
        let queries: Vec<Query> = (0..self.silos.len())
            .map(|i| Query {
                peer_address: None,
                ..self.query(values, i)
            })
            .collect();
        let distances = fan_out(&mut self.silos, |i, silo| {
            let query = &queries[i];
            silo.client.receive_query(query)?;
            let distance = silo.client.fetch_encrypted_distance()?;
            Ok((query.wire_size() + distance.wire_size(), distance))
        })?;

        let mut communication = 0u64;
        let mut best: Option<(usize, i64)> = None;
        for (i, (size, encrypted)) in distances.into_iter().enumerate() {
            communication += size as u64;
            let d = self.keys.decrypt(&self.context.decode(&encrypted)?)?;
            debug!("Silo {i} is at distance {d}");
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }
        let (winner, _) = best.ok_or_else(|| Error::Configuration("No silo to query".to_string()))?;
        Ok((winner, 0, communication))
    }

    /// Asks every silo to reset; failures are only logged.
    fn abort(&mut self) {
        self.silos.par_iter_mut().for_each(|silo| {
            if let Err(e) = silo.client.reset_query() {
                warn!("Could not reset {}: {e}", silo.entry);
            }
        });
    }
}

impl fmt::Debug for QueryUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryUser")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("silos", &self.silos.len())
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}
