// Numan Thabit 2025
//! Structured logging: subscriber setup and the per-call logging interceptor.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use tonic::{Code, Request, Status};
use tracing::{dispatcher, info, Dispatch};
use tracing_subscriber::{fmt, EnvFilter};

use crate::interceptor::{CallResult, Interceptor, MessageStream, MethodInfo, Next, Payload};

/// Build the process logger and install it as the global default.
///
/// The returned handle is what gets passed to interceptors; the global
/// install only covers ambient logs from the runtime and libraries.
pub fn init(default_directive: &str) -> Dispatch {
    let subscriber = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(false)
        .compact()
        .finish();
    let logger = Dispatch::new(subscriber);
    if dispatcher::set_global_default(logger.clone()).is_err() {
        tracing::warn!("global logger already installed");
    }
    logger
}

/// Emits one line before and one line after the rest of the chain runs.
#[derive(Clone)]
pub struct LoggingInterceptor {
    logger: Dispatch,
    index: usize,
    name: String,
}

impl LoggingInterceptor {
    pub fn new(logger: Dispatch, index: usize, name: impl Into<String>) -> Self {
        Self {
            logger,
            index,
            name: name.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn entered(&self, info: &MethodInfo) {
        dispatcher::with_default(&self.logger, || {
            info!(
                name = %self.name,
                index = self.index,
                method = %info,
                "executing interceptor logic"
            );
        });
    }

    fn finished(&self, info: &MethodInfo, code: Code) {
        dispatcher::with_default(&self.logger, || {
            info!(
                name = %self.name,
                index = self.index,
                method = %info,
                code = ?code,
                "finished interceptor logic"
            );
        });
    }
}

#[async_trait]
impl Interceptor<Payload> for LoggingInterceptor {
    async fn intercept(
        &self,
        request: Request<Payload>,
        info: &MethodInfo,
        next: Next<'_, Payload>,
    ) -> CallResult<Payload> {
        self.entered(info);
        let result = next.run(request).await;
        let code = match &result {
            Ok(_) => Code::Ok,
            Err(status) => status.code(),
        };
        self.finished(info, code);
        result
    }
}

#[async_trait]
impl Interceptor<MessageStream> for LoggingInterceptor {
    async fn intercept(
        &self,
        request: Request<Payload>,
        info: &MethodInfo,
        next: Next<'_, MessageStream>,
    ) -> CallResult<MessageStream> {
        self.entered(info);
        match next.run(request).await {
            Ok(response) => {
                let interceptor = self.clone();
                let info = *info;
                Ok(response.map(|inner| {
                    LoggedStream {
                        inner,
                        interceptor,
                        info,
                        done: false,
                    }
                    .boxed()
                }))
            }
            Err(status) => {
                self.finished(info, status.code());
                Err(status)
            }
        }
    }
}

/// Holds back the finished line of a streamed call until the stream ends,
/// yields an error, or is dropped by the consumer.
struct LoggedStream {
    inner: MessageStream,
    interceptor: LoggingInterceptor,
    info: MethodInfo,
    done: bool,
}

impl LoggedStream {
    fn finish(&mut self, code: Code) {
        if !self.done {
            self.done = true;
            self.interceptor.finished(&self.info, code);
        }
    }
}

impl Stream for LoggedStream {
    type Item = Result<Payload, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = match this.inner.poll_next_unpin(cx) {
            Poll::Ready(item) => item,
            Poll::Pending => return Poll::Pending,
        };
        match &item {
            Some(Ok(_)) => {}
            Some(Err(status)) => this.finish(status.code()),
            None => this.finish(Code::Ok),
        }
        Poll::Ready(item)
    }
}

impl Drop for LoggedStream {
    fn drop(&mut self) {
        self.finish(Code::Cancelled);
    }
}
