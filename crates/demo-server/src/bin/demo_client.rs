// Numan Thabit 2025
// crates/demo-server/src/bin/demo_client.rs
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use demo_server::logging;
use demo_server::pb::demo_service_client::DemoServiceClient;
use demo_server::pb::{HelloRequest, HelloStreamRequest};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Calls the demo server in a loop")]
struct Args {
    /// gRPC endpoint of the demo server
    #[arg(long, default_value = "http://127.0.0.1:9093")]
    endpoint: String,
    /// Name sent in every request
    #[arg(long, default_value = "Test")]
    name: String,
    /// Number of calls to make (0 = run forever)
    #[arg(long, default_value_t = 10)]
    count: u64,
    /// Delay between calls
    #[arg(long, default_value_t = 1_000)]
    interval_ms: u64,
    /// Use StreamHello with this many greetings per call instead of SayHello
    #[arg(long)]
    stream: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _logger = logging::init("info");

    let mut client = DemoServiceClient::connect(args.endpoint.clone())
        .await
        .with_context(|| format!("failed to connect to {}", args.endpoint))?;

    let mut sent: u64 = 0;
    while args.count == 0 || sent < args.count {
        sent += 1;
        match args.stream {
            Some(greetings) => {
                let request = HelloStreamRequest {
                    name: args.name.clone(),
                    count: greetings,
                };
                match client.stream_hello(request).await {
                    Ok(response) => {
                        let mut replies = response.into_inner();
                        while let Some(reply) = replies.next().await {
                            match reply {
                                Ok(reply) => info!(call = sent, message = %reply.message, "stream reply"),
                                Err(status) => {
                                    warn!(call = sent, code = ?status.code(), message = %status.message(), "stream failed");
                                    break;
                                }
                            }
                        }
                    }
                    Err(status) => {
                        warn!(call = sent, code = ?status.code(), message = %status.message(), "call failed")
                    }
                }
            }
            None => {
                let request = HelloRequest {
                    name: args.name.clone(),
                };
                match client.say_hello(request).await {
                    Ok(response) => {
                        info!(call = sent, message = %response.into_inner().message, "reply")
                    }
                    Err(status) => {
                        warn!(call = sent, code = ?status.code(), message = %status.message(), "call failed")
                    }
                }
            }
        }
        sleep(Duration::from_millis(args.interval_ms)).await;
    }
    Ok(())
}
