// Numan Thabit 2025
//! demo-server: a gRPC greeting service instrumented with per-call logging
//! interceptors, standard gRPC server metrics and a Prometheus scrape endpoint.

pub mod config;
pub mod error;
pub mod grpc_metrics;
pub mod http;
pub mod interceptor;
pub mod logging;
pub mod metrics;
/// Generated wire types and service stubs.
#[allow(clippy::all, missing_docs)]
pub mod pb;
pub mod service;

mod server;

pub use config::DemoConfig;
pub use error::{Error, Result};
pub use server::{launch, ServerHandle};
