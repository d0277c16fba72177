// Numan Thabit 2025
//! Standard per-method gRPC server metrics and the interceptor that records them.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use prometheus::{opts, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec};
use tonic::{Code, Request};

use crate::error::Result;
use crate::interceptor::{CallResult, Interceptor, MessageStream, MethodInfo, Next, Payload};
use crate::metrics::{current_value, MetricsRegistry};

const METHOD_LABELS: &[&str] = &["grpc_type", "grpc_service", "grpc_method"];
const HANDLED_LABELS: &[&str] = &["grpc_type", "grpc_service", "grpc_method", "grpc_code"];

const ALL_CODES: [Code; 17] = [
    Code::Ok,
    Code::Cancelled,
    Code::Unknown,
    Code::InvalidArgument,
    Code::DeadlineExceeded,
    Code::NotFound,
    Code::AlreadyExists,
    Code::PermissionDenied,
    Code::ResourceExhausted,
    Code::FailedPrecondition,
    Code::Aborted,
    Code::OutOfRange,
    Code::Unimplemented,
    Code::Internal,
    Code::Unavailable,
    Code::DataLoss,
    Code::Unauthenticated,
];

/// Canonical gRPC status name, as exported in the `grpc_code` label.
pub fn code_label(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

#[derive(Clone)]
pub struct ServerMetrics {
    started: IntCounterVec,
    handled: IntCounterVec,
    msg_received: IntCounterVec,
    msg_sent: IntCounterVec,
    handling_seconds: HistogramVec,
    in_flight: IntGaugeVec,
}

impl ServerMetrics {
    pub fn new() -> Result<Self> {
        let started = IntCounterVec::new(
            opts!(
                "grpc_server_started_total",
                "Total number of RPCs started on the server."
            ),
            METHOD_LABELS,
        )?;
        let handled = IntCounterVec::new(
            opts!(
                "grpc_server_handled_total",
                "Total number of RPCs completed on the server, regardless of success or failure."
            ),
            HANDLED_LABELS,
        )?;
        let msg_received = IntCounterVec::new(
            opts!(
                "grpc_server_msg_received_total",
                "Total number of RPC stream messages received on the server."
            ),
            METHOD_LABELS,
        )?;
        let msg_sent = IntCounterVec::new(
            opts!(
                "grpc_server_msg_sent_total",
                "Total number of gRPC stream messages sent by the server."
            ),
            METHOD_LABELS,
        )?;
        let handling_seconds = HistogramVec::new(
            HistogramOpts::new(
                "grpc_server_handling_seconds",
                "Histogram of response latency (seconds) of gRPC that had been application-level handled by the server.",
            ),
            METHOD_LABELS,
        )?;
        let in_flight = IntGaugeVec::new(
            opts!(
                "grpc_server_in_flight_requests",
                "Number of RPCs currently being handled by the server."
            ),
            METHOD_LABELS,
        )?;

        Ok(Self {
            started,
            handled,
            msg_received,
            msg_sent,
            handling_seconds,
            in_flight,
        })
    }

    pub fn register(&self, registry: &MetricsRegistry) -> Result<()> {
        registry.register(Box::new(self.started.clone()))?;
        registry.register(Box::new(self.handled.clone()))?;
        registry.register(Box::new(self.msg_received.clone()))?;
        registry.register(Box::new(self.msg_sent.clone()))?;
        registry.register(Box::new(self.handling_seconds.clone()))?;
        registry.register(Box::new(self.in_flight.clone()))?;
        Ok(())
    }

    /// Create zero-valued series for every method so they are exported before
    /// the first call.
    pub fn initialize(&self, methods: &[MethodInfo]) {
        for info in methods {
            let labels = method_labels(info);
            self.started.with_label_values(&labels);
            self.handling_seconds.with_label_values(&labels);
            self.in_flight.with_label_values(&labels);
            for code in ALL_CODES {
                self.handled
                    .with_label_values(&handled_labels(info, code));
            }
        }
    }

    /// Interceptor recording these metrics; usable in unary and streamed chains.
    pub fn interceptor(&self) -> MetricsInterceptor {
        MetricsInterceptor {
            metrics: self.clone(),
        }
    }

    pub fn started_count(&self, info: &MethodInfo) -> u64 {
        current_value(&self.started, &method_pairs(info)).unwrap_or_default() as u64
    }

    pub fn handled_count(&self, info: &MethodInfo, code: Code) -> u64 {
        current_value(&self.handled, &handled_pairs(info, code)).unwrap_or_default() as u64
    }

    pub fn sent_count(&self, info: &MethodInfo) -> u64 {
        current_value(&self.msg_sent, &method_pairs(info)).unwrap_or_default() as u64
    }

    pub fn received_count(&self, info: &MethodInfo) -> u64 {
        current_value(&self.msg_received, &method_pairs(info)).unwrap_or_default() as u64
    }

    pub fn in_flight(&self, info: &MethodInfo) -> i64 {
        current_value(&self.in_flight, &method_pairs(info)).unwrap_or_default() as i64
    }

    fn begin(&self, info: &MethodInfo) -> CallReport {
        let labels = method_labels(info);
        self.started.with_label_values(&labels).inc();
        self.in_flight.with_label_values(&labels).inc();
        CallReport {
            metrics: self.clone(),
            info: *info,
            started_at: Instant::now(),
            finished: false,
        }
    }
}

fn method_labels(info: &MethodInfo) -> [&'static str; 3] {
    [info.kind.as_str(), info.service, info.method]
}

fn handled_labels(info: &MethodInfo, code: Code) -> [&'static str; 4] {
    [info.kind.as_str(), info.service, info.method, code_label(code)]
}

fn method_pairs(info: &MethodInfo) -> [(&'static str, &'static str); 3] {
    [
        ("grpc_type", info.kind.as_str()),
        ("grpc_service", info.service),
        ("grpc_method", info.method),
    ]
}

fn handled_pairs(info: &MethodInfo, code: Code) -> [(&'static str, &'static str); 4] {
    let [kind, service, method] = method_pairs(info);
    [kind, service, method, ("grpc_code", code_label(code))]
}

/// Tracks one call from start to completion. A report dropped before
/// completion counts as a cancelled call.
struct CallReport {
    metrics: ServerMetrics,
    info: MethodInfo,
    started_at: Instant,
    finished: bool,
}

impl CallReport {
    fn received(&self) {
        self.metrics
            .msg_received
            .with_label_values(&method_labels(&self.info))
            .inc();
    }

    fn sent(&self) {
        self.metrics
            .msg_sent
            .with_label_values(&method_labels(&self.info))
            .inc();
    }

    fn finish(&mut self, code: Code) {
        if self.finished {
            return;
        }
        self.finished = true;
        let labels = method_labels(&self.info);
        self.metrics
            .handled
            .with_label_values(&handled_labels(&self.info, code))
            .inc();
        self.metrics
            .handling_seconds
            .with_label_values(&labels)
            .observe(self.started_at.elapsed().as_secs_f64());
        self.metrics.in_flight.with_label_values(&labels).dec();
    }
}

impl Drop for CallReport {
    fn drop(&mut self) {
        self.finish(Code::Cancelled);
    }
}

/// Counts sent messages and completes the call report when the stream ends.
struct ObservedStream {
    inner: MessageStream,
    report: CallReport,
}

impl Stream for ObservedStream {
    type Item = std::result::Result<Payload, tonic::Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = match this.inner.poll_next_unpin(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => return Poll::Pending,
        };
        match &item {
            Some(Ok(_)) => this.report.sent(),
            Some(Err(status)) => this.report.finish(status.code()),
            None => this.report.finish(Code::Ok),
        }
        Poll::Ready(item)
    }
}

#[derive(Clone)]
pub struct MetricsInterceptor {
    metrics: ServerMetrics,
}

#[async_trait]
impl Interceptor<Payload> for MetricsInterceptor {
    async fn intercept(
        &self,
        request: Request<Payload>,
        info: &MethodInfo,
        next: Next<'_, Payload>,
    ) -> CallResult<Payload> {
        let mut report = self.metrics.begin(info);
        report.received();
        let result = next.run(request).await;
        match &result {
            Ok(_) => {
                report.sent();
                report.finish(Code::Ok);
            }
            Err(status) => report.finish(status.code()),
        }
        result
    }
}

#[async_trait]
impl Interceptor<MessageStream> for MetricsInterceptor {
    async fn intercept(
        &self,
        request: Request<Payload>,
        info: &MethodInfo,
        next: Next<'_, MessageStream>,
    ) -> CallResult<MessageStream> {
        let mut report = self.metrics.begin(info);
        report.received();
        match next.run(request).await {
            Ok(response) => Ok(response.map(|inner| ObservedStream { inner, report }.boxed())),
            Err(status) => {
                report.finish(status.code());
                Err(status)
            }
        }
    }
}
