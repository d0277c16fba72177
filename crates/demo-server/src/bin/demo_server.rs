// Numan Thabit 2025
// crates/demo-server/src/bin/demo_server.rs
use anyhow::Result;
use demo_server::{launch, logging, DemoConfig};
use tracing::{error, info};

// NOTE: graceful shutdown is intentionally absent; the process runs until it
// is killed. Do not use this demo as a production template.
#[tokio::main]
async fn main() -> Result<()> {
    let logger = logging::init("info");

    let handle = match launch(DemoConfig::default(), logger).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "failed to start demo server");
            return Err(err.into());
        }
    };
    info!(
        rpc = %handle.rpc_addr(),
        metrics = %handle.metrics_addr(),
        "demo server started"
    );

    if let Err(err) = handle.wait().await {
        error!(error = %err, "demo server stopped");
        return Err(err.into());
    }
    Ok(())
}
