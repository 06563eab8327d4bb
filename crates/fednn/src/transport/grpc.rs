use crate::dataset::VectorRecord;
use crate::he::EncryptedScalar;
use crate::proto::data_holder_client::DataHolderClient;
use crate::proto::data_holder_server::{DataHolder as DataHolderRpc, DataHolderServer};
use crate::proto::{Empty, EncryptDistance, QueryAnswer, QueryObject};
use crate::silo::{PairComparison, Query, SiloService};
use crate::transport::{SharedSilo, SiloConnector};
use crate::{DataHolder, Error, Result};
use log::info;
use std::net::SocketAddr;
use std::thread;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::runtime::{Builder, Runtime};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};
use tonic::{Request, Response, Status};

/// `http://` endpoint for a roster address given as `host:port`.
fn endpoint(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// The `DataHolder` gRPC service of one silo. Handlers run the blocking
/// silo operations on the runtime's blocking pool, since an initiating silo
/// calls its partner synchronously while it holds its own lock.
struct SiloRpc {
    silo: SharedSilo,
}

impl SiloRpc {
    async fn run<T, F>(&self, operation: F) -> std::result::Result<Response<T>, Status>
    where
        T: Send + 'static,
        F: FnOnce(&mut DataHolder) -> Result<T> + Send + 'static,
    {
        let silo = self.silo.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = silo
                .lock()
                .map_err(|_| Error::Transport("The silo panicked".to_string()))?;
            operation(&mut *guard)
        })
        .await
        .map_err(|e| Status::internal(format!("Task failed: {e}")))?
        .map(Response::new)
        .map_err(Status::from)
    }
}

#[tonic::async_trait]
impl DataHolderRpc for SiloRpc {
    async fn broadcast_query(
        &self,
        request: Request<QueryObject>,
    ) -> std::result::Result<Response<Empty>, Status> {
        let query = Query::from(request.into_inner());
        self.run(move |silo| silo.receive_query(&query).map(|()| Empty {}))
            .await
    }

    async fn get_encrypt_distance(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<EncryptDistance>, Status> {
        self.run(|silo| silo.fetch_encrypted_distance().map(|d| (&d).into()))
            .await
    }

    async fn get_encrypt_perturb_distance(
        &self,
        request: Request<QueryObject>,
    ) -> std::result::Result<Response<EncryptDistance>, Status> {
        let query = Query::from(request.into_inner());
        self.run(move |silo| {
            silo.compute_perturbed_distance(&query)
                .map(|d| (&d).into())
        })
        .await
    }

    async fn exchange_perturbed_distance(
        &self,
        request: Request<EncryptDistance>,
    ) -> std::result::Result<Response<EncryptDistance>, Status> {
        let peer = EncryptedScalar::from(request.into_inner());
        self.run(move |silo| {
            silo.exchange_perturbed_distance(&peer)
                .map(|d| (&d).into())
        })
        .await
    }

    async fn get_double_perturbed_distance(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<EncryptDistance>, Status> {
        self.run(|silo| silo.fetch_double_perturbed_distance().map(|d| (&d).into()))
            .await
    }

    async fn compare_perturbed_distance(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<EncryptDistance>, Status> {
        self.run(|silo| silo.compare_perturbed_distance().map(|c| (&c).into()))
            .await
    }

    async fn get_query_answer(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<QueryAnswer>, Status> {
        self.run(|silo| silo.fetch_answer().map(|r| (&r).into()))
            .await
    }

    async fn finish_query_processing(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<Empty>, Status> {
        self.run(|silo| silo.reset_query().map(|()| Empty {})).await
    }
}

/// Serves the `DataHolder` gRPC service of one silo to the query user and
/// to partner silos.
pub struct SiloServer {
    runtime: Runtime,
    listener: TcpListener,
    silo: SharedSilo,
}

impl SiloServer {
    /// Binds to `address`.
    pub fn bind<A: ToSocketAddrs>(address: A, silo: SharedSilo) -> Result<Self> {
        let runtime = Builder::new_multi_thread().enable_all().build()?;
        let listener = runtime.block_on(TcpListener::bind(address))?;
        Ok(Self {
            runtime,
            listener,
            silo,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until the server fails.
    pub fn serve(self) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);
        let Self {
            runtime,
            listener,
            silo,
        } = self;
        let service = DataHolderServer::new(SiloRpc { silo });
        runtime
            .block_on(
                Server::builder()
                    .add_service(service)
                    .serve_with_incoming(TcpListenerStream::new(listener)),
            )
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Serves requests on a background thread.
    pub fn spawn(self) -> thread::JoinHandle<Result<()>> {
        thread::spawn(move || self.serve())
    }
}

/// Blocking client to a silo's `DataHolder` service.
///
/// Each client drives its channel on its own single-threaded runtime, so it
/// may be used from plain threads and from a server's blocking pool alike.
#[derive(Debug)]
pub struct RemoteSilo {
    address: String,
    runtime: Runtime,
    client: DataHolderClient<Channel>,
}

impl RemoteSilo {
    /// Connects to the silo at `address`.
    pub fn connect(address: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let client = runtime
            .block_on(DataHolderClient::connect(endpoint(address)))
            .map_err(|e| Error::unreachable(address, format!("{e:?}")))?;
        Ok(Self {
            address: address.to_string(),
            runtime,
            client,
        })
    }

    /// Address of the silo.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl SiloService for RemoteSilo {
    fn receive_query(&mut self, query: &Query) -> Result<()> {
        self.runtime
            .block_on(self.client.broadcast_query(QueryObject::from(query)))?;
        Ok(())
    }

    fn compute_perturbed_distance(&mut self, query: &Query) -> Result<EncryptedScalar> {
        let response = self.runtime.block_on(
            self.client
                .get_encrypt_perturb_distance(QueryObject::from(query)),
        )?;
        Ok(response.into_inner().into())
    }

    fn fetch_encrypted_distance(&mut self) -> Result<EncryptedScalar> {
        let response = self
            .runtime
            .block_on(self.client.get_encrypt_distance(Empty {}))?;
        Ok(response.into_inner().into())
    }

    fn exchange_perturbed_distance(&mut self, peer: &EncryptedScalar) -> Result<EncryptedScalar> {
        let response = self.runtime.block_on(
            self.client
                .exchange_perturbed_distance(EncryptDistance::from(peer)),
        )?;
        Ok(response.into_inner().into())
    }

    fn fetch_double_perturbed_distance(&mut self) -> Result<EncryptedScalar> {
        let response = self
            .runtime
            .block_on(self.client.get_double_perturbed_distance(Empty {}))?;
        Ok(response.into_inner().into())
    }

    fn compare_perturbed_distance(&mut self) -> Result<PairComparison> {
        let response = self
            .runtime
            .block_on(self.client.compare_perturbed_distance(Empty {}))?;
        Ok(response.into_inner().into())
    }

    fn fetch_answer(&mut self) -> Result<VectorRecord> {
        let response = self
            .runtime
            .block_on(self.client.get_query_answer(Empty {}))?;
        Ok(response.into_inner().into())
    }

    fn reset_query(&mut self) -> Result<()> {
        self.runtime
            .block_on(self.client.finish_query_processing(Empty {}))?;
        Ok(())
    }
}

/// Opens a gRPC channel per [`SiloConnector::connect`] call.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcConnector;

impl SiloConnector for GrpcConnector {
    fn connect(&self, address: &str) -> Result<Box<dyn SiloService>> {
        Ok(Box::new(RemoteSilo::connect(address)?))
    }
}
