// Numan Thabit 2025
use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::metrics::MetricsRegistry;

/// Every path answers with the current exposition.
pub fn router(registry: MetricsRegistry) -> Router {
    Router::new()
        .fallback(metrics_handler)
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

/// Serve scrapes on an already bound listener until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    registry: MetricsRegistry,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "metrics endpoint ready");
    }
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(Error::Http)
}

async fn metrics_handler(State(registry): State<MetricsRegistry>) -> Response {
    match registry.render() {
        Ok(body) => (StatusCode::OK, [(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
