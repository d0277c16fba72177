// Numan Thabit 2025
//! Ordered interceptor chains wrapped around every RPC.
//!
//! A [`Chain`] is built once from an ordered list of [`Interceptor`]s and then
//! shared by every call. Invoking it runs interceptor 0, which hands control to
//! interceptor 1 through [`Next::run`], and so on until the terminal handler;
//! results unwind through the same interceptors in reverse. Messages travel
//! type-erased as [`Payload`] so one chain serves every method. The typed
//! entry points ([`Chain::unary`], [`Chain::server_streaming`]) restore the
//! concrete message types on both ends.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use tonic::{Request, Response, Status};

/// Type-erased request or response message.
pub type Payload = Box<dyn Any + Send>;

/// Type-erased response stream of a streamed call.
pub type MessageStream = BoxStream<'static, Result<Payload, Status>>;

/// Outcome of a call as seen by an interceptor.
pub type CallResult<T> = Result<Response<T>, Status>;

/// Chain applied to single-response calls.
pub type UnaryChain = Chain<Payload>;

/// Chain applied to calls answered with a message stream.
pub type StreamChain = Chain<MessageStream>;

/// Shape of an RPC. Label values follow the usual gRPC server metric names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    ClientStream,
    ServerStream,
    BidiStream,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::ClientStream => "client_stream",
            CallKind::ServerStream => "server_stream",
            CallKind::BidiStream => "bidi_stream",
        }
    }
}

/// Static descriptor of the method being invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodInfo {
    /// Fully qualified service, e.g. `proto.DemoService`.
    pub service: &'static str,
    /// Method route name, e.g. `SayHello`.
    pub method: &'static str,
    pub kind: CallKind,
}

impl MethodInfo {
    pub const fn new(service: &'static str, method: &'static str, kind: CallKind) -> Self {
        Self {
            service,
            method,
            kind,
        }
    }

    /// `/package.Service/Method`
    pub fn full_method(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.service, self.method)
    }
}

/// Middleware run around a call.
///
/// `T` is the erased response body: [`Payload`] for unary calls and
/// [`MessageStream`] for streamed ones. The request's metadata and extensions
/// carry the in-flight call context. An implementation either forwards the
/// call with `next.run(request)` or answers on its own; since `run` consumes
/// `next`, the rest of the chain executes at most once per call.
#[async_trait]
pub trait Interceptor<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn intercept(
        &self,
        request: Request<Payload>,
        info: &MethodInfo,
        next: Next<'_, T>,
    ) -> CallResult<T>;
}

type Terminal<'a, T> =
    Box<dyn FnOnce(Request<Payload>) -> BoxFuture<'a, CallResult<T>> + Send + 'a>;

/// Remainder of the chain: the interceptors not yet entered plus the handler.
pub struct Next<'a, T>
where
    T: Send + 'static,
{
    rest: &'a [Arc<dyn Interceptor<T>>],
    info: &'a MethodInfo,
    terminal: Terminal<'a, T>,
}

impl<'a, T> Next<'a, T>
where
    T: Send + 'static,
{
    /// Hand the request to the next interceptor, or to the handler once the
    /// chain is exhausted.
    pub fn run(self, request: Request<Payload>) -> BoxFuture<'a, CallResult<T>> {
        let Next {
            rest,
            info,
            terminal,
        } = self;
        match rest.split_first() {
            Some((head, rest)) => head.intercept(
                request,
                info,
                Next {
                    rest,
                    info,
                    terminal,
                },
            ),
            None => terminal(request),
        }
    }
}

/// Frozen, ordered interceptor list shared by every call.
pub struct Chain<T>
where
    T: Send + 'static,
{
    interceptors: Arc<[Arc<dyn Interceptor<T>>]>,
}

impl<T: Send + 'static> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            interceptors: Arc::clone(&self.interceptors),
        }
    }
}

impl<T: Send + 'static> Default for Chain<T> {
    fn default() -> Self {
        ChainBuilder::new().build()
    }
}

impl<T: Send + 'static> fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl<T: Send + 'static> Chain<T> {
    pub fn builder() -> ChainBuilder<T> {
        ChainBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    fn dispatch<'a>(
        &'a self,
        info: &'a MethodInfo,
        request: Request<Payload>,
        terminal: Terminal<'a, T>,
    ) -> BoxFuture<'a, CallResult<T>> {
        Next {
            rest: &self.interceptors,
            info,
            terminal,
        }
        .run(request)
    }
}

impl Chain<Payload> {
    /// Run a unary handler through the chain.
    pub async fn unary<'a, Req, Res, F, Fut>(
        &'a self,
        info: &'a MethodInfo,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<Res>, Status>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        F: FnOnce(Request<Req>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Response<Res>, Status>> + Send + 'a,
    {
        let terminal: Terminal<'a, Payload> = Box::new(move |request: Request<Payload>| {
            let fut: BoxFuture<'a, CallResult<Payload>> = Box::pin(async move {
                let request = restore_request::<Req>(request)?;
                let response = handler(request).await?;
                Ok(response.map(|message| Box::new(message) as Payload))
            });
            fut
        });

        let response = self.dispatch(info, erase_request(request), terminal).await?;
        let (metadata, message, extensions) = response.into_parts();
        let message = restore_message::<Res>(message)?;
        Ok(Response::from_parts(metadata, message, extensions))
    }
}

impl Chain<MessageStream> {
    /// Run a server-streaming handler through the chain.
    pub async fn server_streaming<'a, Req, Res, S, F, Fut>(
        &'a self,
        info: &'a MethodInfo,
        request: Request<Req>,
        handler: F,
    ) -> Result<Response<BoxStream<'static, Result<Res, Status>>>, Status>
    where
        Req: Send + 'static,
        Res: Send + 'static,
        S: Stream<Item = Result<Res, Status>> + Send + 'static,
        F: FnOnce(Request<Req>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Response<S>, Status>> + Send + 'a,
    {
        let terminal: Terminal<'a, MessageStream> = Box::new(move |request: Request<Payload>| {
            let fut: BoxFuture<'a, CallResult<MessageStream>> = Box::pin(async move {
                let request = restore_request::<Req>(request)?;
                let response = handler(request).await?;
                Ok(response.map(|messages| {
                    messages
                        .map(|item| item.map(|message| Box::new(message) as Payload))
                        .boxed()
                }))
            });
            fut
        });

        let response = self.dispatch(info, erase_request(request), terminal).await?;
        Ok(response.map(|messages| {
            messages
                .map(|item| item.and_then(restore_message::<Res>))
                .boxed()
        }))
    }
}

/// Accumulates interceptors in call order.
pub struct ChainBuilder<T>
where
    T: Send + 'static,
{
    interceptors: Vec<Arc<dyn Interceptor<T>>>,
}

impl<T: Send + 'static> ChainBuilder<T> {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    /// Append an interceptor; it runs after every interceptor added before it.
    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor<T>,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn build(self) -> Chain<T> {
        Chain {
            interceptors: self.interceptors.into(),
        }
    }
}

impl<T: Send + 'static> Default for ChainBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn erase_request<M: Send + 'static>(request: Request<M>) -> Request<Payload> {
    request.map(|message| Box::new(message) as Payload)
}

fn restore_request<M: 'static>(request: Request<Payload>) -> Result<Request<M>, Status> {
    let (metadata, extensions, message) = request.into_parts();
    let message = restore_message::<M>(message)?;
    Ok(Request::from_parts(metadata, extensions, message))
}

fn restore_message<M: 'static>(message: Payload) -> Result<M, Status> {
    message.downcast::<M>().map(|boxed| *boxed).map_err(|_| {
        Status::internal(format!(
            "interceptor replaced message with a value that is not {}",
            std::any::type_name::<M>()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tonic::Code;

    const ECHO: MethodInfo = MethodInfo::new("test.Echo", "Echo", CallKind::Unary);
    const ECHO_STREAM: MethodInfo =
        MethodInfo::new("test.Echo", "EchoStream", CallKind::ServerStream);

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recording {
        label: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl<T: Send + 'static> Interceptor<T> for Recording {
        async fn intercept(
            &self,
            request: Request<Payload>,
            _info: &MethodInfo,
            next: Next<'_, T>,
        ) -> CallResult<T> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("before {}", self.label));
            let result = next.run(request).await;
            self.journal
                .lock()
                .unwrap()
                .push(format!("after {}", self.label));
            result
        }
    }

    struct Reject;

    #[async_trait]
    impl Interceptor<Payload> for Reject {
        async fn intercept(
            &self,
            _request: Request<Payload>,
            _info: &MethodInfo,
            _next: Next<'_, Payload>,
        ) -> CallResult<Payload> {
            Err(Status::permission_denied("rejected by interceptor"))
        }
    }

    struct SwapMessage;

    #[async_trait]
    impl Interceptor<Payload> for SwapMessage {
        async fn intercept(
            &self,
            request: Request<Payload>,
            _info: &MethodInfo,
            next: Next<'_, Payload>,
        ) -> CallResult<Payload> {
            next.run(request.map(|_| Box::new(42u64) as Payload)).await
        }
    }

    struct Uppercase;

    #[async_trait]
    impl Interceptor<Payload> for Uppercase {
        async fn intercept(
            &self,
            request: Request<Payload>,
            _info: &MethodInfo,
            next: Next<'_, Payload>,
        ) -> CallResult<Payload> {
            let request = request.map(|message| match message.downcast::<String>() {
                Ok(text) => Box::new(text.to_uppercase()) as Payload,
                Err(other) => other,
            });
            next.run(request).await
        }
    }

    fn recording_chain<T: Send + 'static>(journal: &Journal) -> Chain<T> {
        ["A", "B", "C"]
            .into_iter()
            .fold(Chain::builder(), |builder, label| {
                builder.with(Recording {
                    label,
                    journal: journal.clone(),
                })
            })
            .build()
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn interceptors_enter_in_order_and_unwind_in_reverse() {
        let journal = Journal::default();
        let chain: UnaryChain = recording_chain(&journal);
        assert_eq!(chain.len(), 3);
        let handler_journal = journal.clone();

        let response = chain
            .unary(&ECHO, Request::new("ping".to_string()), |req| async move {
                handler_journal.lock().unwrap().push("handler".into());
                Ok::<_, Status>(Response::new(req.into_inner().len()))
            })
            .await
            .expect("call succeeds");

        assert_eq!(response.into_inner(), 4);
        assert_eq!(
            entries(&journal),
            vec![
                "before A", "before B", "before C", "handler", "after C", "after B", "after A"
            ]
        );
    }

    #[tokio::test]
    async fn failure_propagates_unchanged_and_every_interceptor_unwinds() {
        let journal = Journal::default();
        let chain: UnaryChain = recording_chain(&journal);

        let status = chain
            .unary(&ECHO, Request::new(()), |_req| async move {
                Err::<Response<()>, _>(Status::not_found("no such greeting"))
            })
            .await
            .expect_err("handler failure must surface");

        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "no such greeting");
        assert_eq!(
            entries(&journal),
            vec!["before A", "before B", "before C", "after C", "after B", "after A"]
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let journal = Journal::default();
        let called = Arc::new(AtomicUsize::new(0));
        let chain = UnaryChain::builder()
            .with(Recording {
                label: "outer",
                journal: journal.clone(),
            })
            .with(Reject)
            .build();

        let handler_calls = called.clone();
        let status = chain
            .unary(&ECHO, Request::new(()), |_req| async move {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Status>(Response::new(()))
            })
            .await
            .expect_err("rejecting interceptor short-circuits");

        assert_eq!(status.code(), Code::PermissionDenied);
        assert_eq!(called.load(Ordering::SeqCst), 0);
        assert_eq!(entries(&journal), vec!["before outer", "after outer"]);
    }

    #[tokio::test]
    async fn empty_chain_calls_handler_directly() {
        let chain = UnaryChain::default();
        assert!(chain.is_empty());
        let response = chain
            .unary(&ECHO, Request::new(7u32), |req| async move {
                Ok::<_, Status>(Response::new(req.into_inner() * 2))
            })
            .await
            .unwrap();
        assert_eq!(response.into_inner(), 14);
    }

    #[tokio::test]
    async fn interceptor_can_rewrite_request() {
        let chain = UnaryChain::builder().with(Uppercase).build();
        let response = chain
            .unary(&ECHO, Request::new("quiet".to_string()), |req| async move {
                Ok::<_, Status>(Response::new(req.into_inner()))
            })
            .await
            .unwrap();
        assert_eq!(response.into_inner(), "QUIET");
    }

    #[tokio::test]
    async fn incompatible_message_swap_is_internal_error() {
        let chain = UnaryChain::builder().with(SwapMessage).build();
        let status = chain
            .unary(&ECHO, Request::new("text".to_string()), |req| async move {
                Ok::<_, Status>(Response::new(req.into_inner()))
            })
            .await
            .expect_err("u64 is not a String");
        assert_eq!(status.code(), Code::Internal);
    }

    #[tokio::test]
    async fn metadata_reaches_handler() {
        let chain = UnaryChain::builder().with(Uppercase).build();
        let mut request = Request::new("x".to_string());
        request
            .metadata_mut()
            .insert("x-caller", "unit-test".parse().unwrap());
        let response = chain
            .unary(&ECHO, request, |req| async move {
                let caller = req
                    .metadata()
                    .get("x-caller")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Ok::<_, Status>(Response::new(caller))
            })
            .await
            .unwrap();
        assert_eq!(response.into_inner(), "unit-test");
    }

    #[tokio::test]
    async fn stream_chain_preserves_order_and_items() {
        let journal = Journal::default();
        let chain: StreamChain = recording_chain(&journal);

        let response = chain
            .server_streaming(&ECHO_STREAM, Request::new(3usize), |req| async move {
                let n = req.into_inner();
                Ok::<_, Status>(Response::new(stream::iter((0..n).map(Ok::<_, Status>))))
            })
            .await
            .expect("stream opens");

        let items: Vec<usize> = response
            .into_inner()
            .map(|item| item.expect("item"))
            .collect()
            .await;
        assert_eq!(items, vec![0, 1, 2]);
        assert_eq!(
            entries(&journal),
            vec!["before A", "before B", "before C", "after C", "after B", "after A"]
        );
    }

    #[tokio::test]
    async fn stream_handler_failure_propagates() {
        let chain: StreamChain = recording_chain(&Journal::default());
        let status = chain
            .server_streaming(&ECHO_STREAM, Request::new(()), |_req| async move {
                Err::<Response<stream::Empty<Result<u8, Status>>>, _>(Status::invalid_argument(
                    "too many",
                ))
            })
            .await
            .err()
            .expect("stream must not open");
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "too many");
    }

    #[test]
    fn method_info_formats_full_name() {
        assert_eq!(ECHO.full_method(), "/test.Echo/Echo");
        assert_eq!(ECHO_STREAM.kind.as_str(), "server_stream");
    }
}
