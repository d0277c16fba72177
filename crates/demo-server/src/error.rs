// Numan Thabit 2025
use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("rpc transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("metrics output not utf8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("metrics http server error: {0}")]
    Http(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0} task aborted: {1}")]
    Task(&'static str, #[source] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
