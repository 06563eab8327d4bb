//! Application contexts and their shutdown hook.

use fednn::he::ScalarParameters;
use fednn::transport::SharedSilo;
use fednn::{Error, QueryReport, QueryUser, Result};
use log::{info, warn};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

/// A running party that prints its counters once on shutdown.
///
/// Flushing never waits for work in flight: the shutdown hook calls it from
/// the signal thread while a request may still hold the party's lock.
pub trait FlushAndClose: Send + Sync {
    /// Prints the benchmark report; later calls do nothing.
    fn flush_and_close(&self);

    /// Whether [`FlushAndClose::flush_and_close`] has run.
    fn is_closed(&self) -> bool;
}

/// The data holder side.
pub struct SiloApp {
    silo: SharedSilo,
    closed: AtomicBool,
}

impl SiloApp {
    /// Wraps the silo served by this process.
    pub fn new(silo: SharedSilo) -> Self {
        Self {
            silo,
            closed: AtomicBool::new(false),
        }
    }
}

impl FlushAndClose for SiloApp {
    fn flush_and_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.silo.try_lock() {
            Ok(silo) => println!("{}", silo.report()),
            Err(TryLockError::WouldBlock) => warn!("A request is in flight, no report available"),
            Err(TryLockError::Poisoned(_)) => warn!("The silo panicked, no report available"),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The query user side; refuses new queries once closed.
pub struct UserApp {
    user: Mutex<QueryUser>,
    // Refreshed after every query so flushing never waits on `user`.
    report: Mutex<String>,
    closed: AtomicBool,
}

impl UserApp {
    /// Wraps the coordinator of this process.
    pub fn new(user: QueryUser) -> Self {
        let report = user.report();
        Self {
            user: Mutex::new(user),
            report: Mutex::new(report),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs one random query, unless the application is closing.
    pub fn run_random_query<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<QueryReport> {
        let mut user = self
            .user
            .lock()
            .map_err(|_| Error::Transport("A previous query panicked".to_string()))?;
        if self.is_closed() {
            return Err(Error::Transport("The query user is shutting down".to_string()));
        }
        let outcome = user.run_random_query(rng);
        if let Ok(mut report) = self.report.lock() {
            *report = user.report();
        }
        outcome
    }
}

impl FlushAndClose for UserApp {
    fn flush_and_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.report.lock() {
            Ok(report) => println!("{report}"),
            Err(_) => warn!("A query panicked, no report available"),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Flushes `app` and exits on SIGINT or SIGTERM.
pub fn install_shutdown_hook(app: Arc<dyn FlushAndClose>) -> std::result::Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Shutting down");
        app.flush_and_close();
        std::process::exit(0);
    })
}

/// Logs the encryption parameters in use.
pub fn log_parameters(parameters: &ScalarParameters) {
    info!(
        "BFV parameters: degree = {}, ciphertext moduli = {:?} bits, plaintext modulus = {}",
        parameters.degree, parameters.moduli_sizes, parameters.plaintext_modulus
    );
}

#[cfg(test)]
mod tests {
    use super::{FlushAndClose, SiloApp, UserApp};
    use fednn::config::{ProtocolConfig, RosterEntry};
    use fednn::dataset::{Dataset, VectorRecord};
    use fednn::he::{ScalarContext, ScalarParameters};
    use fednn::orchestrator::SiloHandle;
    use fednn::transport::LocalSilo;
    use fednn::{DataHolder, Error, QueryUser};
    use rand::thread_rng;
    use std::error::Error as StdError;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn closed_apps_refuse_work() -> Result<(), Box<dyn StdError>> {
        let config = ProtocolConfig::with_dimension(2);
        let context = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
        let dataset = Dataset::new(2, vec![VectorRecord::new(0, vec![3, 4])])?;
        let holder = DataHolder::new(0, "alice", config, context.clone(), dataset)?;
        let silo = Arc::new(Mutex::new(holder));

        let client = LocalSilo::new("local:0", silo.clone());
        let entry = RosterEntry {
            address: "local:0".to_string(),
            name: "alice".to_string(),
        };
        let user = QueryUser::new(
            "user",
            config,
            context,
            vec![SiloHandle::new(entry, Box::new(client))],
        )?;
        let app = UserApp::new(user);
        let report = app.run_random_query(&mut thread_rng())?;
        assert_eq!(report.answer.id, 0);

        app.flush_and_close();
        assert!(app.is_closed());
        assert!(matches!(
            app.run_random_query(&mut thread_rng()),
            Err(Error::Transport(_))
        ));

        let silo_app = SiloApp::new(silo);
        assert!(!silo_app.is_closed());
        silo_app.flush_and_close();
        silo_app.flush_and_close();
        assert!(silo_app.is_closed());
        Ok(())
    }

    #[test]
    fn flushing_does_not_wait_for_work_in_flight() -> Result<(), Box<dyn StdError>> {
        let config = ProtocolConfig::with_dimension(2);
        let context = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
        let dataset = Dataset::new(2, vec![VectorRecord::new(0, vec![3, 4])])?;
        let holder = DataHolder::new(0, "alice", config, context.clone(), dataset)?;
        let silo = Arc::new(Mutex::new(holder));
        let entry = RosterEntry {
            address: "local:0".to_string(),
            name: "alice".to_string(),
        };
        let client = LocalSilo::new("local:0", silo.clone());
        let user = QueryUser::new(
            "user",
            config,
            context,
            vec![SiloHandle::new(entry, Box::new(client))],
        )?;
        let app = Arc::new(UserApp::new(user));
        app.run_random_query(&mut thread_rng())?;

        // Both locks stay held while the other thread flushes.
        let _user = app.user.lock().map_err(|_| "poisoned")?;
        let _silo = silo.lock().map_err(|_| "poisoned")?;
        let silo_app = Arc::new(SiloApp::new(silo.clone()));
        let flushing = {
            let app = app.clone();
            let silo_app = silo_app.clone();
            thread::spawn(move || {
                app.flush_and_close();
                silo_app.flush_and_close();
            })
        };
        flushing.join().map_err(|_| "flush panicked")?;
        assert!(app.is_closed());
        assert!(silo_app.is_closed());
        assert!(app.report.lock().map_err(|_| "poisoned")?.contains("1 queries"));
        Ok(())
    }
}
