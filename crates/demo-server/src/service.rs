// Numan Thabit 2025
//! `proto.DemoService` implementation.

use futures::stream::{self, BoxStream};
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::interceptor::{CallKind, MethodInfo, StreamChain, UnaryChain};
use crate::metrics::HelloMetrics;
use crate::pb::demo_service_server::{DemoService, DemoServiceServer};
use crate::pb::{HelloRequest, HelloResponse, HelloStreamRequest};

pub const SERVICE_NAME: &str = "proto.DemoService";

pub const SAY_HELLO: MethodInfo = MethodInfo::new(SERVICE_NAME, "SayHello", CallKind::Unary);
pub const STREAM_HELLO: MethodInfo =
    MethodInfo::new(SERVICE_NAME, "StreamHello", CallKind::ServerStream);

/// Every method registered by [`DemoServer`].
pub const METHODS: [MethodInfo; 2] = [SAY_HELLO, STREAM_HELLO];

/// Upper bound on greetings per `StreamHello` call.
pub const MAX_STREAM_GREETINGS: u32 = 64;

pub fn greeting(name: &str) -> String {
    format!("Hello {name}")
}

/// Greets callers and counts them by name. Every call passes through the
/// configured interceptor chain before reaching the handler body.
#[derive(Clone)]
pub struct DemoServer {
    metrics: HelloMetrics,
    unary: UnaryChain,
    streaming: StreamChain,
}

impl DemoServer {
    pub fn new(metrics: HelloMetrics, unary: UnaryChain, streaming: StreamChain) -> Self {
        Self {
            metrics,
            unary,
            streaming,
        }
    }

    pub fn into_service(self) -> DemoServiceServer<Self> {
        DemoServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl DemoService for DemoServer {
    #[instrument(level = "debug", skip_all)]
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloResponse>, Status> {
        self.unary
            .unary(&SAY_HELLO, request, move |request| async move {
                let HelloRequest { name } = request.into_inner();
                self.metrics.observe(&name);
                Ok::<_, Status>(Response::new(HelloResponse {
                    message: greeting(&name),
                }))
            })
            .await
    }

    type StreamHelloStream = BoxStream<'static, Result<HelloResponse, Status>>;

    #[instrument(level = "debug", skip_all)]
    async fn stream_hello(
        &self,
        request: Request<HelloStreamRequest>,
    ) -> Result<Response<Self::StreamHelloStream>, Status> {
        self.streaming
            .server_streaming(&STREAM_HELLO, request, move |request| async move {
                let HelloStreamRequest { name, count } = request.into_inner();
                if count > MAX_STREAM_GREETINGS {
                    return Err(Status::invalid_argument(format!(
                        "count {count} exceeds limit of {MAX_STREAM_GREETINGS}"
                    )));
                }
                self.metrics.observe(&name);
                let message = greeting(&name);
                let replies = (0..count).map(move |_| {
                    Ok::<_, Status>(HelloResponse {
                        message: message.clone(),
                    })
                });
                Ok(Response::new(stream::iter(replies)))
            })
            .await
    }
}
