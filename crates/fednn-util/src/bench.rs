//! Latency and communication accounting for one protocol party.

use std::fmt;
use std::time::{Duration, Instant};

/// Accumulates per-call latency and byte counts, and the number of completed
/// queries, so that a party can report its average cost per query.
///
/// The counters are purely informational: nothing in the protocol reads them.
#[derive(Debug, Clone, Default)]
pub struct BenchLogger {
    started: Option<Instant>,
    queries: usize,
    elapsed: Duration,
    communication: u64,
}

impl BenchLogger {
    /// Creates a logger with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every counter and any running timer.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Starts (or restarts) the lap timer.
    pub fn start_timer(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stops the lap timer, adds the lap to the cumulative runtime and returns
    /// it. Without a running timer this is a no-op returning zero.
    pub fn stop_timer(&mut self) -> Duration {
        let lap = self
            .started
            .take()
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.elapsed += lap;
        lap
    }

    /// Adds `bytes` to the cumulative communication.
    pub fn add_communication(&mut self, bytes: usize) {
        self.communication += bytes as u64;
    }

    /// Marks one query as completed.
    pub fn record_query(&mut self) {
        self.queries += 1;
    }

    /// Number of completed queries.
    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Cumulative runtime over all laps.
    pub fn total_time(&self) -> Duration {
        self.elapsed
    }

    /// Cumulative communication in bytes.
    pub fn communication(&self) -> u64 {
        self.communication
    }

    /// Average runtime per completed query.
    pub fn average_time(&self) -> Duration {
        match u32::try_from(self.queries) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
        }
    }

    /// Average communication per completed query, in bytes.
    pub fn average_communication(&self) -> f64 {
        if self.queries == 0 {
            0.0
        } else {
            self.communication as f64 / self.queries as f64
        }
    }

    /// One-line summary of the averages.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BenchLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queries: runtime = {:.6} [s], communication = {:.6} [KB] per query",
            self.queries,
            self.average_time().as_secs_f64(),
            self.average_communication() / 1024.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::BenchLogger;
    use std::time::Duration;

    #[test]
    fn empty_logger_reports_zeros() {
        let logger = BenchLogger::new();
        assert_eq!(logger.average_time(), Duration::ZERO);
        assert_eq!(logger.average_communication(), 0.0);
        assert_eq!(
            logger.report(),
            "0 queries: runtime = 0.000000 [s], communication = 0.000000 [KB] per query"
        );
    }

    #[test]
    fn averages_over_queries() {
        let mut logger = BenchLogger::new();
        logger.add_communication(1024);
        logger.add_communication(3072);
        logger.record_query();
        logger.record_query();
        assert_eq!(logger.queries(), 2);
        assert_eq!(logger.communication(), 4096);
        assert_eq!(logger.average_communication(), 2048.0);
        assert!(logger.report().contains("communication = 2.000000 [KB]"));
    }

    #[test]
    fn stop_without_start_is_noop() {
        let mut logger = BenchLogger::new();
        assert_eq!(logger.stop_timer(), Duration::ZERO);
        assert_eq!(logger.total_time(), Duration::ZERO);

        logger.start_timer();
        std::thread::sleep(Duration::from_millis(2));
        let lap = logger.stop_timer();
        assert!(lap >= Duration::from_millis(2));
        assert_eq!(logger.total_time(), lap);

        // The timer is consumed by the first stop.
        assert_eq!(logger.stop_timer(), Duration::ZERO);
        assert_eq!(logger.total_time(), lap);
    }

    #[test]
    fn reset_clears_everything() {
        let mut logger = BenchLogger::new();
        logger.add_communication(10);
        logger.record_query();
        logger.start_timer();
        logger.reset();
        assert_eq!(logger.queries(), 0);
        assert_eq!(logger.communication(), 0);
        assert_eq!(logger.stop_timer(), Duration::ZERO);
    }
}
