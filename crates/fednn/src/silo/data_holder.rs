use crate::blinding::{self, BlindingFactor};
use crate::config::{validate_bounds, validate_safe_range, ProtocolConfig};
use crate::dataset::{Dataset, VectorRecord};
use crate::he::{EncryptedScalar, ScalarContext};
use crate::proto::WireSize;
use crate::silo::{PairComparison, Query, SiloPhase, SiloQueryState, SiloService};
use crate::topology::is_initiator;
use crate::transport::SiloConnector;
use crate::{Error, Result};
use fednn_util::BenchLogger;
use fhe::bfv::PublicKey;
use log::{debug, info, warn};
use rand::thread_rng;
use std::fmt;
use std::sync::Arc;

/// A silo: a private dataset and the per-query protocol state around it.
pub struct DataHolder {
    id: usize,
    name: String,
    config: ProtocolConfig,
    context: ScalarContext,
    dataset: Dataset,
    connector: Option<Arc<dyn SiloConnector>>,
    // Not secret, so it outlives `reset_query`: a query may omit the key.
    public_key: Option<PublicKey>,
    state: SiloQueryState,
    logger: BenchLogger,
}

impl DataHolder {
    /// Creates a silo serving `dataset`, whose dimension must match `config`.
    /// Fails when `config` lets a blinded difference wrap around the
    /// plaintext modulus of `context`.
    pub fn new(
        id: usize,
        name: impl Into<String>,
        config: ProtocolConfig,
        context: ScalarContext,
        dataset: Dataset,
    ) -> Result<Self> {
        validate_bounds(&config)?;
        validate_safe_range(&config, context.plaintext_modulus())?;
        if dataset.dimension() != config.dimension {
            return Err(Error::dimension_mismatch(
                config.dimension,
                dataset.dimension(),
            ));
        }
        if dataset.is_empty() {
            return Err(Error::empty_dataset());
        }
        Ok(Self {
            id,
            name: name.into(),
            config,
            context,
            dataset,
            connector: None,
            public_key: None,
            state: SiloQueryState::default(),
            logger: BenchLogger::new(),
        })
    }

    /// Sets how this silo reaches its pair partners.
    pub fn with_connector(mut self, connector: Arc<dyn SiloConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Identifier of the silo.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Name of the silo.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The records served.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Current phase.
    pub fn phase(&self) -> SiloPhase {
        self.state.phase
    }

    /// Per-query state.
    pub fn query_state(&self) -> &SiloQueryState {
        &self.state
    }

    /// Latency and communication counters.
    pub fn logger(&self) -> &BenchLogger {
        &self.logger
    }

    /// Summary of the counters, for the shutdown report.
    pub fn report(&self) -> String {
        format!(
            "-------------- Data Holder #{} {} Log --------------\n{}",
            self.id, self.name, self.logger
        )
    }

    fn metered<T, F>(&mut self, operation: &str, request: usize, f: F) -> Result<T>
    where
        T: WireSize,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.logger.start_timer();
        let result = f(self);
        let lap = self.logger.stop_timer();
        match &result {
            Ok(response) => {
                self.logger
                    .add_communication(request + response.wire_size());
                debug!("[{}] {operation} served in {lap:?}", self.name);
            }
            Err(e) => warn!("[{}] {operation} rejected: {e}", self.name),
        }
        result
    }

    fn load_public_key(&mut self, bytes: &[u8]) -> Result<()> {
        if !bytes.is_empty() {
            self.public_key = Some(self.context.decode_public_key(bytes)?);
        }
        Ok(())
    }

    fn public_key(&self) -> Result<&PublicKey> {
        self.public_key.as_ref().ok_or_else(|| {
            Error::ProtocolViolation("No public key has been received".to_string())
        })
    }

    fn receive(&mut self, query: &Query) -> Result<()> {
        self.state.require("BroadcastQuery", &[SiloPhase::Idle])?;
        self.config.check_vector(&query.values)?;
        self.load_public_key(&query.public_key)?;
        self.public_key()?;

        let nearest = self.dataset.nearest(&query.values)?;
        debug!(
            "[{}] nearest neighbor {} at distance {}",
            self.name, nearest.record.id, nearest.distance
        );
        self.state = SiloQueryState {
            phase: SiloPhase::QueryReceived,
            query: query.values.clone(),
            nearest: Some(nearest),
            peer_address: query.peer_address.clone(),
            position: query.position,
            ..SiloQueryState::default()
        };
        Ok(())
    }

    fn perturb(&mut self, query: &Query) -> Result<EncryptedScalar> {
        let distance = self.state.require_query("GetEncryptPerturbDistance")?.distance;
        if self.state.query != query.values {
            return Err(Error::ProtocolViolation(
                "GetEncryptPerturbDistance carries a different query vector".to_string(),
            ));
        }
        self.load_public_key(&query.public_key)?;

        let mut rng = thread_rng();
        let r = BlindingFactor::sample(self.config.max_blinding_factor, &mut rng)?;
        let perturbed = blinding::perturb(&self.context, self.public_key()?, distance, &r, &mut rng)?;
        let encrypted = perturbed.to_encrypted();

        self.state.blinding = Some(r);
        self.state.own_perturbed = Some(perturbed);
        self.state.peer_perturbed = None;
        self.state.peer_address = query.peer_address.clone();
        self.state.position = query.position;
        self.state.phase = SiloPhase::LocallyPerturbed;
        Ok(encrypted)
    }

    fn encrypted_distance(&mut self) -> Result<EncryptedScalar> {
        let distance = self.state.require_query("GetEncryptDistance")?.distance;
        let encrypted = self
            .context
            .encrypt(self.public_key()?, distance, &mut thread_rng())?;
        Ok(encrypted.to_encrypted())
    }

    fn exchange(&mut self, peer: &EncryptedScalar) -> Result<EncryptedScalar> {
        if is_initiator(self.state.position) {
            return Err(Error::wrong_initiator(
                "ExchangePerturbedDistance",
                self.state.position,
            ));
        }
        self.state
            .require("ExchangePerturbedDistance", &[SiloPhase::LocallyPerturbed])?;
        let own = self
            .state
            .own_perturbed
            .as_ref()
            .ok_or_else(|| Error::unexpected_state("ExchangePerturbedDistance", "without a perturbed distance"))?
            .to_encrypted();

        self.state.peer_perturbed = Some(self.context.decode(peer)?);
        self.state.phase = SiloPhase::Exchanged;
        Ok(own)
    }

    fn double_perturb(&mut self) -> Result<EncryptedScalar> {
        self.state
            .require("GetDoublePerturbedDistance", &[SiloPhase::Exchanged])?;
        let (peer, r) = match (&self.state.peer_perturbed, &self.state.blinding) {
            (Some(peer), Some(r)) => (peer, r),
            _ => {
                return Err(Error::unexpected_state(
                    "GetDoublePerturbedDistance",
                    "without a partner value",
                ))
            }
        };
        let doubled = blinding::double_perturb(&self.context, peer, r)?;
        self.state.phase = SiloPhase::DoublePerturbed;
        Ok(doubled.to_encrypted())
    }

    fn compare(&mut self) -> Result<PairComparison> {
        if !is_initiator(self.state.position) {
            return Err(Error::wrong_initiator(
                "ComparePerturbedDistance",
                self.state.position,
            ));
        }
        self.state
            .require("ComparePerturbedDistance", &[SiloPhase::LocallyPerturbed])?;
        let address = self.state.peer_address.clone().ok_or_else(|| {
            Error::ProtocolViolation("ComparePerturbedDistance without a partner".to_string())
        })?;
        let connector = self.connector.clone().ok_or_else(|| {
            Error::Configuration(format!("Silo {} cannot reach its partners", self.name))
        })?;
        let own = self
            .state
            .own_perturbed
            .as_ref()
            .ok_or_else(|| Error::unexpected_state("ComparePerturbedDistance", "without a perturbed distance"))?
            .to_encrypted();

        let mut peer = connector.connect(&address)?;
        let peer_encrypted = peer.exchange_perturbed_distance(&own)?;
        let peer_perturbed = self.context.decode(&peer_encrypted)?;
        let own_doubled_encrypted = peer.fetch_double_perturbed_distance()?;
        let own_doubled = self.context.decode(&own_doubled_encrypted)?;

        let r = self.state.blinding.as_ref().ok_or_else(|| {
            Error::unexpected_state("ComparePerturbedDistance", "without a blinding factor")
        })?;
        let peer_doubled = blinding::double_perturb(&self.context, &peer_perturbed, r)?;
        let delta = blinding::blinded_difference(&self.context, &own_doubled, &peer_doubled)?;
        self.state.peer_perturbed = Some(peer_perturbed);
        self.state.phase = SiloPhase::DoublePerturbed;

        let peer_communication =
            own.wire_size() + peer_encrypted.wire_size() + own_doubled_encrypted.wire_size();
        self.logger.add_communication(peer_communication);
        debug!(
            "[{}] compared with {address}, {peer_communication} bytes exchanged",
            self.name
        );
        Ok(PairComparison {
            delta: delta.to_encrypted(),
            peer_communication: peer_communication as u64,
        })
    }

    fn answer(&mut self) -> Result<VectorRecord> {
        let record = self.state.require_query("GetQueryAnswer")?.record.clone();
        self.state.phase = SiloPhase::AnswerPending;
        info!("[{}] answering with record {}", self.name, record.id);
        Ok(record)
    }

    fn reset(&mut self) -> Result<()> {
        if self.state.phase != SiloPhase::Idle {
            self.logger.record_query();
            debug!("[{}] query finished", self.name);
        }
        self.state.clear();
        Ok(())
    }
}

impl SiloService for DataHolder {
    fn receive_query(&mut self, query: &Query) -> Result<()> {
        self.metered("BroadcastQuery", query.wire_size(), |s| s.receive(query))
    }

    fn compute_perturbed_distance(&mut self, query: &Query) -> Result<EncryptedScalar> {
        self.metered("GetEncryptPerturbDistance", query.wire_size(), |s| {
            s.perturb(query)
        })
    }

    fn fetch_encrypted_distance(&mut self) -> Result<EncryptedScalar> {
        self.metered("GetEncryptDistance", 0, Self::encrypted_distance)
    }

    fn exchange_perturbed_distance(&mut self, peer: &EncryptedScalar) -> Result<EncryptedScalar> {
        self.metered("ExchangePerturbedDistance", peer.wire_size(), |s| {
            s.exchange(peer)
        })
    }

    fn fetch_double_perturbed_distance(&mut self) -> Result<EncryptedScalar> {
        self.metered("GetDoublePerturbedDistance", 0, Self::double_perturb)
    }

    fn compare_perturbed_distance(&mut self) -> Result<PairComparison> {
        self.metered("ComparePerturbedDistance", 0, Self::compare)
    }

    fn fetch_answer(&mut self) -> Result<VectorRecord> {
        self.metered("GetQueryAnswer", 0, Self::answer)
    }

    fn reset_query(&mut self) -> Result<()> {
        self.metered("FinishQueryProcessing", 0, Self::reset)
    }
}

impl fmt::Debug for DataHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataHolder")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("records", &self.dataset.len())
            .field("phase", &self.state.phase)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::DataHolder;
    use crate::config::ProtocolConfig;
    use crate::dataset::{Dataset, VectorRecord};
    use crate::he::{KeyPair, ScalarContext, ScalarParameters};
    use crate::silo::{Query, SiloPhase, SiloService};
    use crate::Error;
    use rand::thread_rng;
    use std::error::Error as StdError;

    fn config() -> ProtocolConfig {
        ProtocolConfig {
            dimension: 2,
            max_coordinate: 100,
            max_blinding_factor: 100,
        }
    }

    fn setup() -> Result<(ScalarContext, KeyPair, DataHolder), Box<dyn StdError>> {
        let ctx = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
        let keys = KeyPair::generate(&ctx, &mut thread_rng());
        let dataset = Dataset::new(
            2,
            vec![
                VectorRecord::new(0, vec![10, 10]),
                VectorRecord::new(1, vec![3, 4]),
            ],
        )?;
        let holder = DataHolder::new(0, "alice", config(), ctx.clone(), dataset)?;
        Ok((ctx, keys, holder))
    }

    fn query(keys: &KeyPair, values: Vec<i64>, position: usize) -> Query {
        Query {
            values,
            public_key: keys.public_key_bytes().to_vec(),
            peer_address: None,
            position,
        }
    }

    #[test]
    fn plain_distance() -> Result<(), Box<dyn StdError>> {
        let (ctx, keys, mut holder) = setup()?;
        holder.receive_query(&query(&keys, vec![0, 0], 0))?;
        assert_eq!(holder.phase(), SiloPhase::QueryReceived);

        let d = holder.fetch_encrypted_distance()?;
        assert_eq!(keys.decrypt(&ctx.decode(&d)?)?, 25);
        assert_eq!(holder.fetch_answer()?, VectorRecord::new(1, vec![3, 4]));
        assert_eq!(holder.phase(), SiloPhase::AnswerPending);

        holder.reset_query()?;
        assert_eq!(holder.phase(), SiloPhase::Idle);
        assert_eq!(holder.logger().queries(), 1);
        assert!(holder.logger().communication() > 0);
        Ok(())
    }

    #[test]
    fn responder_walks_through_states() -> Result<(), Box<dyn StdError>> {
        let (ctx, keys, mut holder) = setup()?;
        let q = query(&keys, vec![3, 4], 1);
        holder.receive_query(&q)?;
        let p = holder.compute_perturbed_distance(&q)?;
        assert_eq!(holder.phase(), SiloPhase::LocallyPerturbed);
        assert!(holder.query_state().has_blinding_factor());
        // Distance 0, so the perturbed value is the blinding factor itself.
        let r = keys.decrypt(&ctx.decode(&p)?)?;
        assert!((1..=100).contains(&r));

        let initiator = ctx.encrypt(keys.public_key(), 10, &mut thread_rng())?;
        let own = holder.exchange_perturbed_distance(&initiator.to_encrypted())?;
        assert_eq!(own, p);
        assert_eq!(holder.phase(), SiloPhase::Exchanged);

        // A second delivery is rejected.
        assert!(matches!(
            holder.exchange_perturbed_distance(&initiator.to_encrypted()),
            Err(Error::ProtocolViolation(_))
        ));

        let doubled = holder.fetch_double_perturbed_distance()?;
        assert_eq!(keys.decrypt(&ctx.decode(&doubled)?)?, 10 * r);
        assert_eq!(holder.phase(), SiloPhase::DoublePerturbed);
        Ok(())
    }

    #[test]
    fn out_of_order_calls_are_rejected() -> Result<(), Box<dyn StdError>> {
        let (ctx, keys, mut holder) = setup()?;
        let dummy = ctx
            .encrypt(keys.public_key(), 1, &mut thread_rng())?
            .to_encrypted();

        assert!(matches!(holder.fetch_answer(), Err(Error::ProtocolViolation(_))));
        assert!(matches!(
            holder.fetch_double_perturbed_distance(),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(matches!(
            holder.compute_perturbed_distance(&query(&keys, vec![0, 0], 0)),
            Err(Error::ProtocolViolation(_))
        ));

        let q = query(&keys, vec![0, 0], 0);
        holder.receive_query(&q)?;
        assert!(matches!(
            holder.receive_query(&q),
            Err(Error::ProtocolViolation(_))
        ));
        holder.compute_perturbed_distance(&q)?;

        // Position 0 initiates and may not be exchanged with.
        assert!(matches!(
            holder.exchange_perturbed_distance(&dummy),
            Err(Error::ProtocolViolation(_))
        ));
        // No partner in this round.
        assert!(matches!(
            holder.compare_perturbed_distance(),
            Err(Error::ProtocolViolation(_))
        ));
        // A different query vector.
        assert!(matches!(
            holder.compute_perturbed_distance(&query(&keys, vec![1, 1], 0)),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(holder.phase(), SiloPhase::LocallyPerturbed);
        Ok(())
    }

    #[test]
    fn invalid_queries() -> Result<(), Box<dyn StdError>> {
        let (_, keys, mut holder) = setup()?;
        assert!(matches!(
            holder.receive_query(&query(&keys, vec![1, 2, 3], 0)),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            holder.receive_query(&query(&keys, vec![1, 200], 0)),
            Err(Error::Configuration(_))
        ));
        let keyless = Query {
            public_key: vec![],
            ..query(&keys, vec![1, 2], 0)
        };
        assert!(matches!(
            holder.receive_query(&keyless),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(holder.phase(), SiloPhase::Idle);
        assert_eq!(holder.logger().communication(), 0);

        // Once loaded, the key may be omitted.
        holder.receive_query(&query(&keys, vec![1, 2], 0))?;
        holder.reset_query()?;
        holder.receive_query(&keyless)?;
        Ok(())
    }

    #[test]
    fn foreign_key_is_rejected() -> Result<(), Box<dyn StdError>> {
        let (_, _, mut holder) = setup()?;
        let other = ScalarContext::new(&ScalarParameters {
            plaintext_modulus: (1 << 42) + 1,
            ..ScalarParameters::insecure_for_tests()
        })?;
        let foreign = KeyPair::generate(&other, &mut thread_rng());
        assert!(matches!(
            holder.receive_query(&query(&foreign, vec![1, 2], 0)),
            Err(Error::ParameterMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn mismatched_dataset() -> Result<(), Box<dyn StdError>> {
        let ctx = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
        let dataset = Dataset::new(3, vec![VectorRecord::new(0, vec![1, 2, 3])])?;
        assert!(DataHolder::new(0, "bob", config(), ctx.clone(), dataset).is_err());
        let empty = Dataset::new(2, vec![])?;
        assert!(DataHolder::new(0, "bob", config(), ctx, empty).is_err());
        Ok(())
    }

    #[test]
    fn unsafe_configuration() -> Result<(), Box<dyn StdError>> {
        let ctx = ScalarContext::new(&ScalarParameters::insecure_for_tests())?;
        let dataset = Dataset::new(2, vec![VectorRecord::new(0, vec![1, 2])])?;
        let wide_blinding = ProtocolConfig {
            max_blinding_factor: 1 << 20,
            ..config()
        };
        assert!(matches!(
            DataHolder::new(0, "bob", wide_blinding, ctx.clone(), dataset.clone()),
            Err(Error::Configuration(_))
        ));
        let no_blinding = ProtocolConfig {
            max_blinding_factor: 0,
            ..config()
        };
        assert!(matches!(
            DataHolder::new(0, "bob", no_blinding, ctx.clone(), dataset.clone()),
            Err(Error::Configuration(_))
        ));
        assert!(DataHolder::new(0, "bob", config(), ctx, dataset).is_ok());
        Ok(())
    }
}
