// Numan Thabit 2025
//! Top-level wiring: registry, interceptor chains, RPC and metrics listeners.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{info, Dispatch};

use crate::config::DemoConfig;
use crate::error::{Error, Result};
use crate::grpc_metrics::ServerMetrics;
use crate::http;
use crate::interceptor::{StreamChain, UnaryChain};
use crate::logging::LoggingInterceptor;
use crate::metrics::{HelloMetrics, MetricsRegistry};
use crate::service::{DemoServer, METHODS};

const FIRST_INTERCEPTOR: &str = "first interceptor capturing the server e2e latency in logs";
const SECOND_INTERCEPTOR: &str =
    "second interceptor capturing the server e2e latency in prometheus metrics";

/// Owner of the two server tasks.
///
/// Both tasks watch the same cancellation token. Nothing in the demo binary
/// cancels it, so the process ends only when it is killed.
pub struct ServerHandle {
    rpc_addr: SocketAddr,
    metrics_addr: SocketAddr,
    registry: MetricsRegistry,
    rpc_task: JoinHandle<Result<()>>,
    metrics_task: JoinHandle<Result<()>>,
    shutdown: CancellationToken,
}

impl ServerHandle {
    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Resolve once either server exits, returning the first failure.
    pub async fn wait(self) -> Result<()> {
        let Self {
            mut rpc_task,
            mut metrics_task,
            shutdown,
            ..
        } = self;
        let (first, rest, rest_name) = tokio::select! {
            res = &mut rpc_task => (flatten("rpc", res), metrics_task, "metrics"),
            res = &mut metrics_task => (flatten("metrics", res), rpc_task, "rpc"),
        };
        shutdown.cancel();
        first?;
        flatten(rest_name, rest.await)
    }

    /// Signal both servers to stop and wait for them.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        let rpc = flatten("rpc", self.rpc_task.await);
        let metrics = flatten("metrics", self.metrics_task.await);
        rpc.and(metrics)
    }
}

fn flatten(
    task: &'static str,
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined.map_err(|err| Error::Task(task, err))?
}

async fn bind(listener: &'static str, addr: SocketAddr) -> Result<(TcpListener, SocketAddr)> {
    let socket = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind {
            listener,
            addr,
            source,
        })?;
    let local = socket.local_addr().map_err(|source| Error::Bind {
        listener,
        addr,
        source,
    })?;
    Ok((socket, local))
}

/// Bind both listeners and start serving.
///
/// Bind failures are returned before any task is spawned.
pub async fn launch(config: DemoConfig, logger: Dispatch) -> Result<ServerHandle> {
    config.validate()?;

    let registry = MetricsRegistry::new();
    let grpc_metrics = ServerMetrics::new()?;
    grpc_metrics.register(&registry)?;
    let hello_metrics = HelloMetrics::new()?;
    hello_metrics.register(&registry)?;
    hello_metrics.preinitialize(config.preinitialized_names.as_slice());

    let unary = UnaryChain::builder()
        .with(LoggingInterceptor::new(logger.clone(), 0, FIRST_INTERCEPTOR))
        .with(LoggingInterceptor::new(logger.clone(), 1, SECOND_INTERCEPTOR))
        .with(grpc_metrics.interceptor())
        .build();
    let streaming = StreamChain::builder()
        .with(LoggingInterceptor::new(logger.clone(), 0, FIRST_INTERCEPTOR))
        .with(LoggingInterceptor::new(logger, 1, SECOND_INTERCEPTOR))
        .with(grpc_metrics.interceptor())
        .build();

    let service = DemoServer::new(hello_metrics, unary, streaming).into_service();
    grpc_metrics.initialize(&METHODS);

    let (rpc_listener, rpc_addr) = bind("rpc", config.rpc_bind).await?;
    let (metrics_listener, metrics_addr) = bind("metrics", config.metrics_bind).await?;

    let shutdown = CancellationToken::new();

    let metrics_task = tokio::spawn(http::serve(
        metrics_listener,
        registry.clone(),
        shutdown.clone(),
    ));

    let rpc_shutdown = shutdown.clone();
    let rpc_task = tokio::spawn(async move {
        info!(addr = %rpc_addr, "rpc server listening");
        Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(TcpListenerStream::new(rpc_listener), async move {
                rpc_shutdown.cancelled().await
            })
            .await?;
        Ok::<(), Error>(())
    });

    Ok(ServerHandle {
        rpc_addr,
        metrics_addr,
        registry,
        rpc_task,
        metrics_task,
        shutdown,
    })
}
