use crate::dataset::VectorRecord;
use std::fmt;
use std::time::Duration;

/// Outcome and cost of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReport {
    /// Per-session query counter, starting at 1.
    pub query_id: u64,
    /// Roster index of the winning silo.
    pub winner: usize,
    /// Name of the winning silo.
    pub winner_name: String,
    /// The nearest record overall.
    pub answer: VectorRecord,
    /// Wall-clock time of the query.
    pub elapsed: Duration,
    /// Bytes exchanged, including silo-to-silo traffic.
    pub communication: u64,
    /// Tournament rounds played.
    pub rounds: usize,
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Query #{}: runtime = {:.6} [s], communication = {:.6} [KB], rounds = {}",
            self.query_id,
            self.elapsed.as_secs_f64(),
            self.communication as f64 / 1024.0,
            self.rounds
        )?;
        write!(
            f,
            "Answer #{}: data holder = {}, data = {}",
            self.query_id, self.winner_name, self.answer
        )
    }
}
